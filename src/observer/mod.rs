use crate::classify::Outcome;
use crate::playback::{PlaybackController, PlaybackPhase};
use crate::projector::DerivedView;
use crate::spec::SimulationKind;

#[cfg(feature = "serde")]
use serde::Serialize;

/// A read-only snapshot of what a playback controller is showing.
///
/// Design intent:
/// - Observers cannot move the cursor or touch the timer.
/// - Snapshotting clones the current view; the controller keeps its own.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PlaybackSnapshot {
    pub kind: SimulationKind,
    pub phase: PlaybackPhase,
    /// `-1` before the first step.
    pub position: isize,
    pub is_playing: bool,
    pub total_steps: usize,
    pub progress: f64,
    pub interval_ms: u32,
    pub verdict: Option<Outcome>,
    pub counting: Option<CountingSummary>,
    pub view: DerivedView,
}

/// Counting-only facts about the input that the matrix itself does not show.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CountingSummary {
    pub normalized_text: String,
    pub vocabulary_labels: Vec<String>,
    pub vocabulary_limit: usize,
    pub skipped_symbols: usize,
    pub skipped_pairs: usize,
    pub fallback_vocabulary: bool,
}

pub struct ControllerAdapter<'a> {
    controller: &'a PlaybackController,
}

impl<'a> ControllerAdapter<'a> {
    pub fn new(controller: &'a PlaybackController) -> Self {
        Self { controller }
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let c = self.controller;
        let kind = c.kind();

        let counting = match c.trajectory() {
            crate::engine::Trajectory::Counting(run) => Some(CountingSummary {
                normalized_text: run.normalized_text().to_string(),
                vocabulary_labels: run.vocabulary().labels(),
                vocabulary_limit: run.spec().vocabulary_limit,
                skipped_symbols: run.vocabulary().skipped_symbols(),
                skipped_pairs: run.skipped_pairs(),
                fallback_vocabulary: run.vocabulary().is_fallback(),
            }),
            crate::engine::Trajectory::Optimization(_) => None,
        };

        PlaybackSnapshot {
            kind,
            phase: c.phase(),
            position: c.position(),
            is_playing: c.is_playing(),
            total_steps: c.total_steps(),
            progress: c.progress(),
            interval_ms: c.config().interval_ms(kind),
            verdict: c.verdict(),
            counting,
            view: c.view().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::PlaybackConfig;
    use crate::spec::{CountingSpec, Preset};

    #[test]
    fn snapshot_reflects_controller_without_moving_it() {
        let mut c = PlaybackController::with_spec(
            PlaybackConfig::default(),
            CountingSpec::new("Hello, World!").with_vocabulary_limit(5).into(),
        );
        c.step_forward();
        c.step_forward();

        let s = ControllerAdapter::new(&c).snapshot();
        assert_eq!(s.kind, SimulationKind::Counting);
        assert_eq!(s.position, 1);
        assert_eq!(s.phase, PlaybackPhase::Stepped);
        assert_eq!(s.verdict, None);
        assert_eq!(s.interval_ms, 380);

        let summary = s.counting.expect("counting summary");
        assert_eq!(summary.normalized_text, "hello world");
        assert_eq!(summary.vocabulary_labels, vec!["h", "e", "l", "o", "␠"]);
        // w, r, d did not fit.
        assert_eq!(summary.skipped_symbols, 3);
        assert_eq!(c.position(), 1);
    }

    #[test]
    fn optimization_snapshot_carries_verdict() {
        let c = PlaybackController::with_spec(PlaybackConfig::default(), Preset::Good.spec());
        let s = ControllerAdapter::new(&c).snapshot();
        assert_eq!(s.verdict, Some(Outcome::Converged));
        assert!(s.counting.is_none());
        assert_eq!(s.position, -1);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn snapshot_serializes_to_json() {
        let c = PlaybackController::with_spec(PlaybackConfig::default(), Preset::Hello.spec());
        let json = serde_json::to_value(ControllerAdapter::new(&c).snapshot()).unwrap();
        assert_eq!(json["phase"], "idle");
        assert_eq!(json["view"]["kind"], "counting");
        assert_eq!(json["total_steps"], 10);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn overflowed_run_still_parses_as_numbers() {
        use crate::spec::OptimizationSpec;

        let mut c = PlaybackController::with_spec(
            PlaybackConfig::default(),
            OptimizationSpec::running_example(1e200).into(),
        );
        c.jump_to_end();
        let text = serde_json::to_string(&ControllerAdapter::new(&c).snapshot()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();

        let loss: f64 = serde_json::from_value(json["view"]["current"]["loss"].clone()).unwrap();
        assert!(loss.is_finite());
        let losses: Vec<f64> = serde_json::from_value(json["view"]["losses"].clone()).unwrap();
        assert_eq!(losses.len(), 2);
        assert_eq!(losses[0], 49.0);
        assert_eq!(json["verdict"], "diverged");
    }
}
