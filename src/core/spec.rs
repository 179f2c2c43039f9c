//! Simulation parameters.
//!
//! A [`SimulationSpec`] fully determines a step sequence: building the same spec
//! twice must replay identically. The engine accepts any spec and absorbs
//! degenerate values locally; [`SimulationSpec::validate`] exists for the UI
//! boundary, which wants to reject obviously bad input before building.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Loss above which an optimization run is cut short and classified as diverged.
pub const DIVERGENCE_BOUND: f64 = 1e4;

/// Loss below which an optimization run counts as converged.
pub const CONVERGENCE_EPSILON: f64 = 0.01;

/// Longest source text accepted at the boundary (characters, before normalization).
pub const MAX_SOURCE_CHARS: usize = 4096;

/// Input for character-pair counting.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CountingSpec {
    pub source_text: String,
    #[cfg_attr(feature = "serde", serde(default = "default_vocabulary_limit"))]
    pub vocabulary_limit: usize,
}

#[cfg(feature = "serde")]
fn default_vocabulary_limit() -> usize {
    CountingSpec::DEFAULT_VOCABULARY_LIMIT
}

impl CountingSpec {
    pub const DEFAULT_VOCABULARY_LIMIT: usize = 12;

    pub fn new(source_text: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            vocabulary_limit: Self::DEFAULT_VOCABULARY_LIMIT,
        }
    }

    pub fn with_vocabulary_limit(mut self, limit: usize) -> Self {
        self.vocabulary_limit = limit;
        self
    }
}

impl Default for CountingSpec {
    fn default() -> Self {
        Self::new("hello world")
    }
}

/// Input for a gradient-descent replay on a single linear neuron with squared error.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OptimizationSpec {
    pub initial_weights: Vec<f64>,
    pub target: f64,
    pub inputs: Vec<f64>,
    pub learning_rate: f64,
    pub max_steps: usize,
}

impl OptimizationSpec {
    /// The running example used throughout the lessons: `w1*1 + w2*2`, target 3,
    /// starting from `(4, 3)`.
    pub fn running_example(learning_rate: f64) -> Self {
        Self {
            initial_weights: vec![4.0, 3.0],
            target: 3.0,
            inputs: vec![1.0, 2.0],
            learning_rate,
            max_steps: 40,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
}

/// The parameter set that deterministically determines a whole step sequence.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum SimulationSpec {
    Counting(CountingSpec),
    Optimization(OptimizationSpec),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SimulationKind {
    Counting,
    Optimization,
}

impl SimulationKind {
    pub fn label(self) -> &'static str {
        match self {
            SimulationKind::Counting => "counting",
            SimulationKind::Optimization => "optimization",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpecError {
    #[error("source text is {len} characters; the limit is {max}")]
    SourceTooLong { len: usize, max: usize },
    #[error("vocabulary limit must be at least 1")]
    EmptyVocabularyLimit,
    #[error("at least one initial weight is required")]
    NoWeights,
    #[error("{weights} weights but {inputs} inputs")]
    LengthMismatch { weights: usize, inputs: usize },
    #[error("learning rate must be positive and finite (got {0})")]
    LearningRate(f64),
    #[error("max_steps must be at least 1")]
    NoSteps,
    #[error("{field} must be finite")]
    NotFinite { field: &'static str },
}

impl SimulationSpec {
    pub fn kind(&self) -> SimulationKind {
        match self {
            SimulationSpec::Counting(_) => SimulationKind::Counting,
            SimulationSpec::Optimization(_) => SimulationKind::Optimization,
        }
    }

    /// Boundary checks for values collected from user input.
    ///
    /// Building never depends on this: an unvalidated spec still produces a
    /// bounded (possibly empty) sequence.
    pub fn validate(&self) -> Result<(), SpecError> {
        match self {
            SimulationSpec::Counting(c) => {
                let len = c.source_text.chars().count();
                if len > MAX_SOURCE_CHARS {
                    return Err(SpecError::SourceTooLong {
                        len,
                        max: MAX_SOURCE_CHARS,
                    });
                }
                if c.vocabulary_limit == 0 {
                    return Err(SpecError::EmptyVocabularyLimit);
                }
                Ok(())
            }
            SimulationSpec::Optimization(o) => {
                if o.initial_weights.is_empty() {
                    return Err(SpecError::NoWeights);
                }
                if o.initial_weights.len() != o.inputs.len() {
                    return Err(SpecError::LengthMismatch {
                        weights: o.initial_weights.len(),
                        inputs: o.inputs.len(),
                    });
                }
                if !o.initial_weights.iter().all(|w| w.is_finite()) {
                    return Err(SpecError::NotFinite {
                        field: "initial_weights",
                    });
                }
                if !o.inputs.iter().all(|x| x.is_finite()) {
                    return Err(SpecError::NotFinite { field: "inputs" });
                }
                if !o.target.is_finite() {
                    return Err(SpecError::NotFinite { field: "target" });
                }
                if !(o.learning_rate.is_finite() && o.learning_rate > 0.0) {
                    return Err(SpecError::LearningRate(o.learning_rate));
                }
                if o.max_steps == 0 {
                    return Err(SpecError::NoSteps);
                }
                Ok(())
            }
        }
    }
}

impl From<CountingSpec> for SimulationSpec {
    fn from(spec: CountingSpec) -> Self {
        SimulationSpec::Counting(spec)
    }
}

impl From<OptimizationSpec> for SimulationSpec {
    fn from(spec: OptimizationSpec) -> Self {
        SimulationSpec::Optimization(spec)
    }
}

/// Named parameter sets that reproduce the lesson demos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// "hello world" bigram counting.
    Hello,
    /// Learning rate too small: barely moves in 40 steps.
    Tiny,
    /// Learning rate that converges smoothly.
    Good,
    /// Learning rate large enough to blow up.
    Big,
    /// Full-gradient step (lr = 1) from a smaller start; explodes within a few steps.
    Divergent,
    /// 1-D parabola `(w - 0)^2` with a rate that keeps overshooting the minimum.
    Overshoot,
}

impl Preset {
    pub fn label(self) -> &'static str {
        match self {
            Preset::Hello => "hello",
            Preset::Tiny => "tiny",
            Preset::Good => "good",
            Preset::Big => "big",
            Preset::Divergent => "divergent",
            Preset::Overshoot => "overshoot",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|p| p.label().eq_ignore_ascii_case(label.trim()))
    }

    pub fn all() -> &'static [Preset] {
        &[
            Preset::Hello,
            Preset::Tiny,
            Preset::Good,
            Preset::Big,
            Preset::Divergent,
            Preset::Overshoot,
        ]
    }

    pub fn spec(self) -> SimulationSpec {
        match self {
            Preset::Hello => CountingSpec::default().into(),
            Preset::Tiny => OptimizationSpec::running_example(0.001).into(),
            Preset::Good => OptimizationSpec::running_example(0.02).into(),
            Preset::Big => OptimizationSpec::running_example(0.3).into(),
            Preset::Divergent => OptimizationSpec {
                initial_weights: vec![2.5, 1.8],
                target: 3.0,
                inputs: vec![1.0, 2.0],
                learning_rate: 1.0,
                max_steps: 8,
            }
            .into(),
            Preset::Overshoot => OptimizationSpec {
                initial_weights: vec![4.0],
                target: 0.0,
                inputs: vec![1.0],
                learning_rate: 0.95,
                max_steps: 30,
            }
            .into(),
        }
    }
}

/// Texts with punctuation, repeats, overflowing vocabularies and nothing at all.
#[cfg(test)]
pub(crate) const LESSON_TEXTS: &[&str] = &[
    "hello world",
    "The quick brown fox jumps over the lazy dog",
    "abc abc abc",
    "Mississippi!",
    "",
    "12345 ?!",
    "  spaced   out  ",
];

/// Every preset, every lesson text under several caps, and a diverging rate.
#[cfg(test)]
pub(crate) fn lesson_specs() -> Vec<SimulationSpec> {
    let mut specs: Vec<SimulationSpec> = LESSON_TEXTS
        .iter()
        .flat_map(|t| {
            [0, 3, 12].map(|limit| {
                SimulationSpec::from(CountingSpec::new(*t).with_vocabulary_limit(limit))
            })
        })
        .collect();
    specs.extend(Preset::all().iter().map(|p| p.spec()));
    specs.push(OptimizationSpec::running_example(1.5).into());
    specs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid_and_labels_unique() {
        let mut labels: Vec<&str> = Preset::all().iter().map(|p| p.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), Preset::all().len());

        for p in Preset::all() {
            assert_eq!(Preset::from_label(p.label()), Some(*p));
            assert!(p.spec().validate().is_ok(), "preset {} invalid", p.label());
        }
    }

    #[test]
    fn validate_rejects_boundary_mistakes() {
        let bad_lr = SimulationSpec::from(OptimizationSpec::running_example(0.0));
        assert_eq!(bad_lr.validate(), Err(SpecError::LearningRate(0.0)));

        let no_steps = SimulationSpec::from(OptimizationSpec::running_example(0.02).with_max_steps(0));
        assert_eq!(no_steps.validate(), Err(SpecError::NoSteps));

        let mut mismatch = OptimizationSpec::running_example(0.02);
        mismatch.inputs.push(3.0);
        assert!(matches!(
            SimulationSpec::from(mismatch).validate(),
            Err(SpecError::LengthMismatch { weights: 2, inputs: 3 })
        ));

        let zero_limit = SimulationSpec::from(CountingSpec::new("abc").with_vocabulary_limit(0));
        assert_eq!(zero_limit.validate(), Err(SpecError::EmptyVocabularyLimit));
    }

    #[test]
    fn empty_text_is_still_valid() {
        // Empty input is "nothing to play", not an error.
        assert!(SimulationSpec::from(CountingSpec::new("")).validate().is_ok());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn spec_json_is_tagged_by_kind() {
        let spec: SimulationSpec =
            serde_json::from_str(r#"{"kind":"counting","source_text":"abc"}"#).unwrap();
        assert_eq!(
            spec,
            SimulationSpec::Counting(CountingSpec::new("abc"))
        );
        assert_eq!(spec.kind(), SimulationKind::Counting);
    }
}
