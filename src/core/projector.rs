//! Derived views.
//!
//! A view is always rebuilt from `steps[0..=cursor]`. There is no way to hand a
//! previous view back in, so a view can never carry counts from a cursor
//! position the user has since scrubbed away from.

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::classify::Outcome;
#[cfg(feature = "serde")]
use crate::engine::finite;
use crate::engine::{CountStep, CountingRun, DescentStep, OptimizationRun, Trajectory};
use crate::prng::Prng;
use crate::vocab::Vocabulary;

/// Dense `n x n` pair counts, row = preceding symbol, column = following symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CountMatrix {
    size: usize,
    cells: Vec<u32>,
}

impl CountMatrix {
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            cells: vec![0; size * size],
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u32 {
        if row >= self.size || col >= self.size {
            return 0;
        }
        self.cells[row * self.size + col]
    }

    #[inline]
    fn increment(&mut self, row: usize, col: usize) {
        if row < self.size && col < self.size {
            self.cells[row * self.size + col] += 1;
        }
    }

    pub fn row(&self, row: usize) -> &[u32] {
        if row >= self.size {
            return &[];
        }
        &self.cells[row * self.size..(row + 1) * self.size]
    }

    pub fn row_total(&self, row: usize) -> u32 {
        self.row(row).iter().sum()
    }

    pub fn total(&self) -> u32 {
        self.cells.iter().sum()
    }

    /// Each count divided by its row total. An empty row stays all zero.
    pub fn row_probabilities(&self, row: usize) -> Vec<f64> {
        let total = self.row_total(row);
        self.row(row)
            .iter()
            .map(|&c| {
                if total == 0 {
                    0.0
                } else {
                    c as f64 / total as f64
                }
            })
            .collect()
    }

    /// Non-zero cells as `(row, col, count)`, row-major.
    pub fn nonzero(&self) -> Vec<(usize, usize, u32)> {
        self.cells
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c > 0)
            .map(|(i, &c)| (i / self.size, i % self.size, c))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CountingView {
    pub vocabulary: Vocabulary,
    pub counts: CountMatrix,
    /// The step at the cursor; its cell is the one to highlight.
    pub active: Option<CountStep>,
    pub applied_steps: usize,
    pub total_steps: usize,
}

impl CountingView {
    pub fn active_cell(&self) -> Option<(usize, usize)> {
        self.active.map(|s| (s.row, s.col))
    }

    pub fn count_of(&self, from: char, to: char) -> u32 {
        match (self.vocabulary.index_of(from), self.vocabulary.index_of(to)) {
            (Some(r), Some(c)) => self.counts.get(r, c),
            _ => 0,
        }
    }

    /// Walk the counted transitions starting at `start`, drawing each next
    /// symbol in proportion to its count. Stops early at a row with no counts.
    /// Returns an empty string when `start` is not in the vocabulary.
    pub fn sample(&self, start: char, len: usize, rng: &mut Prng) -> String {
        let Some(mut row) = self.vocabulary.index_of(start) else {
            return String::new();
        };

        let mut out = String::with_capacity(len + 1);
        out.push(start);
        for _ in 0..len {
            let total = self.counts.row_total(row) as usize;
            if total == 0 {
                break;
            }
            let mut r = rng.gen_range_usize(0, total);
            let mut next = None;
            for (col, &c) in self.counts.row(row).iter().enumerate() {
                let c = c as usize;
                if r < c {
                    next = Some(col);
                    break;
                }
                r -= c;
            }
            let Some(col) = next else { break };
            let Some(sym) = self.vocabulary.symbol(col) else {
                break;
            };
            out.push(sym);
            row = col;
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct DescentView {
    #[cfg_attr(feature = "serde", serde(serialize_with = "finite::seq"))]
    pub losses: Vec<f64>,
    #[cfg_attr(feature = "serde", serde(serialize_with = "finite::seq"))]
    pub outputs: Vec<f64>,
    /// Weight vector per applied step (pre-update, as recorded).
    #[cfg_attr(feature = "serde", serde(serialize_with = "finite::nested"))]
    pub weights: Vec<Vec<f64>>,
    pub current: Option<DescentStep>,
    pub applied_steps: usize,
    pub total_steps: usize,
    /// Whole-run verdict; identical at every cursor position.
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum DerivedView {
    Counting(CountingView),
    Optimization(DescentView),
}

impl DerivedView {
    pub fn applied_steps(&self) -> usize {
        match self {
            DerivedView::Counting(v) => v.applied_steps,
            DerivedView::Optimization(v) => v.applied_steps,
        }
    }

    pub fn as_counting(&self) -> Option<&CountingView> {
        match self {
            DerivedView::Counting(v) => Some(v),
            DerivedView::Optimization(_) => None,
        }
    }

    pub fn as_descent(&self) -> Option<&DescentView> {
        match self {
            DerivedView::Optimization(v) => Some(v),
            DerivedView::Counting(_) => None,
        }
    }
}

/// Number of steps covered by `cursor`, clamped to the sequence.
#[inline]
fn applied_len(cursor: Option<usize>, len: usize) -> usize {
    cursor.map_or(0, |c| c.saturating_add(1).min(len))
}

/// Project the view at `cursor` (`None` = before the first step).
pub fn project(trajectory: &Trajectory, cursor: Option<usize>) -> DerivedView {
    match trajectory {
        Trajectory::Counting(run) => DerivedView::Counting(project_counting(run, cursor)),
        Trajectory::Optimization(run) => DerivedView::Optimization(project_descent(run, cursor)),
    }
}

pub fn project_counting(run: &CountingRun, cursor: Option<usize>) -> CountingView {
    let steps = run.steps();
    let applied = applied_len(cursor, steps.len());

    let mut counts = CountMatrix::zeros(run.vocabulary().len());
    for s in &steps[..applied] {
        counts.increment(s.row, s.col);
    }

    CountingView {
        vocabulary: run.vocabulary().clone(),
        counts,
        active: applied.checked_sub(1).map(|i| steps[i]),
        applied_steps: applied,
        total_steps: steps.len(),
    }
}

pub fn project_descent(run: &OptimizationRun, cursor: Option<usize>) -> DescentView {
    let steps = run.steps();
    let applied = applied_len(cursor, steps.len());
    let prefix = &steps[..applied];

    DescentView {
        losses: prefix.iter().map(|s| s.loss).collect(),
        outputs: prefix.iter().map(|s| s.output).collect(),
        weights: prefix.iter().map(|s| s.weights.clone()).collect(),
        current: prefix.last().cloned(),
        applied_steps: applied,
        total_steps: steps.len(),
        outcome: run.outcome(),
    }
}
