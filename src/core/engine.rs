//! Step generation.
//!
//! `generate` is a pure function of its spec. The returned runs own their steps
//! and expose them read-only; nothing downstream can patch a step after the
//! fact, which is what lets every view be replayed from a prefix.

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::spec::{CountingSpec, OptimizationSpec, SimulationKind, SimulationSpec, DIVERGENCE_BOUND};
use crate::vocab::{normalize, Vocabulary};

/// Hard ceiling on optimization replays, independent of `max_steps`.
pub const MAX_REPLAY_STEPS: usize = 10_000;

/// One counted character pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CountStep {
    pub index: usize,
    pub from: char,
    pub to: char,
    pub row: usize,
    pub col: usize,
    /// Offset of `from` in the normalized text.
    pub position: usize,
}

/// One gradient-descent iteration. All quantities are taken *before* the
/// weight update of this iteration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct DescentStep {
    pub index: usize,
    #[cfg_attr(feature = "serde", serde(serialize_with = "finite::seq"))]
    pub weights: Vec<f64>,
    #[cfg_attr(feature = "serde", serde(serialize_with = "finite::scalar"))]
    pub output: f64,
    #[cfg_attr(feature = "serde", serde(serialize_with = "finite::scalar"))]
    pub error: f64,
    #[cfg_attr(feature = "serde", serde(serialize_with = "finite::scalar"))]
    pub loss: f64,
    #[cfg_attr(feature = "serde", serde(serialize_with = "finite::seq"))]
    pub gradients: Vec<f64>,
}

/// JSON has no infinities or NaN. A diverged run can overflow, so on the wire
/// every non-finite value saturates to the largest finite magnitude.
#[cfg(feature = "serde")]
pub(crate) mod finite {
    use serde::ser::{SerializeSeq, Serializer};

    #[inline]
    pub fn saturate(v: f64) -> f64 {
        if v.is_nan() {
            f64::MAX
        } else {
            v.clamp(f64::MIN, f64::MAX)
        }
    }

    pub fn scalar<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(saturate(*v))
    }

    pub fn seq<S: Serializer>(v: &[f64], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(v.iter().map(|&x| saturate(x)))
    }

    pub fn nested<S: Serializer>(v: &[Vec<f64>], s: S) -> Result<S::Ok, S::Error> {
        let mut out = s.serialize_seq(Some(v.len()))?;
        for row in v {
            out.serialize_element(&row.iter().map(|&x| saturate(x)).collect::<Vec<_>>())?;
        }
        out.end()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountingRun {
    spec: CountingSpec,
    normalized: String,
    vocabulary: Vocabulary,
    steps: Vec<CountStep>,
    skipped_pairs: usize,
}

impl CountingRun {
    pub fn spec(&self) -> &CountingSpec {
        &self.spec
    }

    pub fn normalized_text(&self) -> &str {
        &self.normalized
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn steps(&self) -> &[CountStep] {
        &self.steps
    }

    /// Adjacent pairs dropped because one side fell outside the vocabulary.
    pub fn skipped_pairs(&self) -> usize {
        self.skipped_pairs
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationRun {
    spec: OptimizationSpec,
    steps: Vec<DescentStep>,
    truncated: bool,
}

impl OptimizationRun {
    pub fn spec(&self) -> &OptimizationSpec {
        &self.spec
    }

    pub fn steps(&self) -> &[DescentStep] {
        &self.steps
    }

    /// True when generation stopped because the loss left the divergence bound.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

/// The immutable step sequence of one spec, tagged by simulation kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Trajectory {
    Counting(CountingRun),
    Optimization(OptimizationRun),
}

impl Trajectory {
    pub fn kind(&self) -> SimulationKind {
        match self {
            Trajectory::Counting(_) => SimulationKind::Counting,
            Trajectory::Optimization(_) => SimulationKind::Optimization,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Trajectory::Counting(run) => run.steps.len(),
            Trajectory::Optimization(run) => run.steps.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the final step, if there is one.
    pub fn last_index(&self) -> Option<usize> {
        self.len().checked_sub(1)
    }
}

impl Default for Trajectory {
    fn default() -> Self {
        Trajectory::Counting(generate_counting(&CountingSpec::new("")))
    }
}

pub fn generate(spec: &SimulationSpec) -> Trajectory {
    match spec {
        SimulationSpec::Counting(c) => Trajectory::Counting(generate_counting(c)),
        SimulationSpec::Optimization(o) => Trajectory::Optimization(generate_optimization(o)),
    }
}

pub fn generate_counting(spec: &CountingSpec) -> CountingRun {
    let normalized = normalize(&spec.source_text);
    let vocabulary = Vocabulary::from_normalized(&normalized, spec.vocabulary_limit);

    let chars: Vec<char> = normalized.chars().collect();
    let mut steps = Vec::with_capacity(chars.len().saturating_sub(1));
    let mut skipped_pairs = 0;

    for (position, pair) in chars.windows(2).enumerate() {
        let (from, to) = (pair[0], pair[1]);
        match (vocabulary.index_of(from), vocabulary.index_of(to)) {
            (Some(row), Some(col)) => steps.push(CountStep {
                index: steps.len(),
                from,
                to,
                row,
                col,
                position,
            }),
            _ => skipped_pairs += 1,
        }
    }

    CountingRun {
        spec: spec.clone(),
        normalized,
        vocabulary,
        steps,
        skipped_pairs,
    }
}

pub fn generate_optimization(spec: &OptimizationSpec) -> OptimizationRun {
    // Missing inputs contribute nothing; extra inputs have no weight to scale.
    let input = |i: usize| spec.inputs.get(i).copied().unwrap_or(0.0);

    let budget = spec.max_steps.min(MAX_REPLAY_STEPS);
    let mut weights = spec.initial_weights.clone();
    let mut steps = Vec::with_capacity(budget.min(256));
    let mut truncated = false;

    for index in 0..budget {
        let output: f64 = weights.iter().enumerate().map(|(i, w)| w * input(i)).sum();
        let error = output - spec.target;
        let loss = error * error;
        let gradients: Vec<f64> = (0..weights.len()).map(|i| 2.0 * error * input(i)).collect();

        steps.push(DescentStep {
            index,
            weights: weights.clone(),
            output,
            error,
            loss,
            gradients: gradients.clone(),
        });

        // NaN fails the comparison too.
        if !(loss <= DIVERGENCE_BOUND) {
            truncated = true;
            break;
        }

        for (w, g) in weights.iter_mut().zip(&gradients) {
            *w -= spec.learning_rate * g;
        }
    }

    OptimizationRun {
        spec: spec.clone(),
        steps,
        truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_is_deterministic() {
        for spec in crate::spec::lesson_specs() {
            assert_eq!(generate(&spec), generate(&spec), "spec: {spec:?}");
        }
    }

    #[test]
    fn hello_world_counts_every_adjacent_pair() {
        let run = generate_counting(&CountingSpec::new("hello world"));
        assert_eq!(
            run.vocabulary().symbols(),
            &['h', 'e', 'l', 'o', ' ', 'w', 'r', 'd']
        );
        assert_eq!(run.steps().len(), 10);
        assert_eq!(run.skipped_pairs(), 0);

        let first = run.steps()[0];
        assert_eq!((first.from, first.to, first.row, first.col), ('h', 'e', 0, 1));
        for (i, s) in run.steps().iter().enumerate() {
            assert_eq!(s.index, i);
        }
    }

    #[test]
    fn pairs_outside_the_vocabulary_are_skipped() {
        // Cap of 2 keeps {a, b}; every pair touching 'c' is dropped.
        let run = generate_counting(&CountingSpec::new("abcab").with_vocabulary_limit(2));
        let pairs: Vec<(char, char)> = run.steps().iter().map(|s| (s.from, s.to)).collect();
        assert_eq!(pairs, vec![('a', 'b'), ('a', 'b')]);
        assert_eq!(run.skipped_pairs(), 2);
        assert_eq!(run.vocabulary().skipped_symbols(), 1);
        // Indices stay contiguous even with gaps in position.
        assert_eq!(run.steps()[1].index, 1);
        assert_eq!(run.steps()[1].position, 3);
    }

    #[test]
    fn fully_filtered_text_is_an_empty_run_with_fallback_vocabulary() {
        let run = generate_counting(&CountingSpec::new("123 !?"));
        // Only the space survives normalization, so no pairs.
        assert_eq!(run.normalized_text(), " ");
        assert!(run.steps().is_empty());

        let run = generate_counting(&CountingSpec::new("42"));
        assert!(run.steps().is_empty());
        assert!(run.vocabulary().is_fallback());
    }

    #[test]
    fn descent_records_pre_update_quantities() {
        let run = generate_optimization(&OptimizationSpec::running_example(0.02));
        let s0 = &run.steps()[0];
        assert_eq!(s0.weights, vec![4.0, 3.0]);
        assert_eq!(s0.output, 10.0);
        assert_eq!(s0.error, 7.0);
        assert_eq!(s0.loss, 49.0);
        assert_eq!(s0.gradients, vec![14.0, 28.0]);

        let s1 = &run.steps()[1];
        assert!((s1.weights[0] - 3.72).abs() < 1e-12);
        assert!((s1.weights[1] - 2.44).abs() < 1e-12);
        assert_eq!(run.steps().len(), 40);
        assert!(!run.truncated());
    }

    #[test]
    fn divergence_stops_generation() {
        let run = generate_optimization(&OptimizationSpec::running_example(1.5));
        assert!(run.truncated());
        assert!(run.steps().len() < 40);
        assert!(run.steps().last().unwrap().loss > DIVERGENCE_BOUND);
        for pair in run.steps().windows(2) {
            assert!(pair[1].loss > pair[0].loss);
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn overflowed_step_serializes_as_finite_numbers() {
        let run = generate_optimization(&OptimizationSpec::running_example(1e200));
        let last = run.steps().last().unwrap();
        assert!(last.loss.is_infinite());

        let json = serde_json::to_string(last).unwrap();
        let back: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back["loss"].as_f64(), Some(f64::MAX));
        assert!(back["output"].as_f64().unwrap().is_finite());

        assert_eq!(finite::saturate(f64::NEG_INFINITY), f64::MIN);
        assert_eq!(finite::saturate(f64::NAN), f64::MAX);
        assert_eq!(finite::saturate(49.0), 49.0);
    }

    #[test]
    fn degenerate_optimization_input_terminates() {
        let spec = OptimizationSpec {
            initial_weights: vec![1.0, 1.0, 1.0],
            target: 0.0,
            inputs: vec![1.0],
            learning_rate: f64::NAN,
            max_steps: usize::MAX,
        };
        let run = generate_optimization(&spec);
        // NaN weights after the first update make the loss NaN, which stops generation.
        assert_eq!(run.steps().len(), 2);
        assert!(run.truncated());

        let none = generate_optimization(&OptimizationSpec::running_example(0.02).with_max_steps(0));
        assert!(none.steps().is_empty());
    }

    #[test]
    fn replay_length_is_capped() {
        let spec = OptimizationSpec {
            initial_weights: vec![0.0],
            target: 0.0,
            inputs: vec![1.0],
            learning_rate: 0.1,
            max_steps: usize::MAX,
        };
        assert_eq!(generate_optimization(&spec).steps().len(), MAX_REPLAY_STEPS);
    }
}
