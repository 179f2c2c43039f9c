//! Terminal verdict of an optimization run.
//!
//! The verdict describes the whole run. It is never computed on a playback
//! prefix, so it cannot flip while the cursor moves.

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::engine::{DescentStep, OptimizationRun};
use crate::spec::{CONVERGENCE_EPSILON, DIVERGENCE_BOUND};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Outcome {
    Converged,
    Oscillating,
    Diverged,
    Indeterminate,
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Converged => "converged",
            Outcome::Oscillating => "oscillating",
            Outcome::Diverged => "diverged",
            Outcome::Indeterminate => "indeterminate",
        }
    }

    pub fn is_terminal_failure(self) -> bool {
        matches!(self, Outcome::Diverged)
    }
}

/// Fewer steps than this cannot show a sustained overshoot.
pub const MIN_OSCILLATION_STEPS: usize = 4;

/// Classify a complete step sequence. Total: every input, including the empty
/// slice, maps to a verdict.
pub fn classify(steps: &[DescentStep]) -> Outcome {
    let Some(last) = steps.last() else {
        return Outcome::Indeterminate;
    };

    if !(last.loss <= DIVERGENCE_BOUND) {
        return Outcome::Diverged;
    }
    if last.loss < CONVERGENCE_EPSILON {
        return Outcome::Converged;
    }

    // For a linear neuron, sign(error) is the sign of (w - w*) projected on the
    // input direction, so an alternating error sign means each update jumps
    // across the optimum.
    if steps.len() < MIN_OSCILLATION_STEPS {
        return Outcome::Indeterminate;
    }
    if let [.., prev, last] = steps {
        let (a, b) = (prev.error, last.error);
        if a != 0.0 && b != 0.0 && a.signum() != b.signum() {
            return Outcome::Oscillating;
        }
    }

    Outcome::Indeterminate
}

impl OptimizationRun {
    pub fn outcome(&self) -> Outcome {
        if self.truncated() {
            return Outcome::Diverged;
        }
        classify(self.steps())
    }
}
