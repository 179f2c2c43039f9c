//! Playback controller: cursor, autoplay timer, and view refresh.
//!
//! The controller never runs a timer itself. `play()` hands out a
//! [`TimerTicket`]; whoever owns the real clock calls [`PlaybackController::tick`]
//! with that ticket on every interval. Each cancellation (pause, reset, build,
//! scrub, jump, teardown, completion) bumps an internal generation, after which
//! every older ticket is rejected. A tick that arrives late can therefore
//! never move the cursor of a sequence it was not issued for.

use core::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::classify::Outcome;
use crate::engine::{generate, Trajectory};
use crate::projector::{project, DerivedView};
use crate::spec::{SimulationKind, SimulationSpec};

pub const MIN_INTERVAL_MS: u32 = 10;
pub const MAX_INTERVAL_MS: u32 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlaybackConfig {
    pub counting_interval_ms: u32,
    pub optimization_interval_ms: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            counting_interval_ms: 380,
            optimization_interval_ms: 100,
        }
    }
}

impl PlaybackConfig {
    pub fn with_counting_interval_ms(mut self, ms: u32) -> Self {
        self.counting_interval_ms = ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS);
        self
    }

    pub fn with_optimization_interval_ms(mut self, ms: u32) -> Self {
        self.optimization_interval_ms = ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS);
        self
    }

    pub fn interval_ms(&self, kind: SimulationKind) -> u32 {
        let ms = match kind {
            SimulationKind::Counting => self.counting_interval_ms,
            SimulationKind::Optimization => self.optimization_interval_ms,
        };
        ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS)
    }

    pub fn interval(&self, kind: SimulationKind) -> Duration {
        Duration::from_millis(self.interval_ms(kind) as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PlaybackPhase {
    Idle,
    Stepped,
    Playing,
    Complete,
}

impl PlaybackPhase {
    pub fn label(self) -> &'static str {
        match self {
            PlaybackPhase::Idle => "idle",
            PlaybackPhase::Stepped => "stepped",
            PlaybackPhase::Playing => "playing",
            PlaybackPhase::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackState {
    cursor: Option<usize>,
    is_playing: bool,
}

impl PlaybackState {
    /// `None` before the first step.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Cursor as a signed position, `-1` before the first step.
    pub fn position(&self) -> isize {
        self.cursor.map_or(-1, |c| c as isize)
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }
}

/// Permission to advance the cursor once per interval. Only valid until the
/// next cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTicket {
    generation: u64,
    interval: Duration,
}

impl TimerTicket {
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Advanced { cursor: usize },
    /// Reached the last step; the ticket is now spent.
    Completed { cursor: usize },
    /// The ticket was invalidated; the timer should stop.
    Stale,
}

impl TickOutcome {
    pub fn keeps_running(self) -> bool {
        matches!(self, TickOutcome::Advanced { .. })
    }
}

#[derive(Debug)]
pub struct PlaybackController {
    config: PlaybackConfig,
    spec: Option<SimulationSpec>,
    trajectory: Trajectory,
    state: PlaybackState,
    generation: u64,
    view: DerivedView,
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new(PlaybackConfig::default())
    }
}

impl PlaybackController {
    pub fn new(config: PlaybackConfig) -> Self {
        let trajectory = Trajectory::default();
        let view = project(&trajectory, None);
        Self {
            config,
            spec: None,
            trajectory,
            state: PlaybackState::default(),
            generation: 0,
            view,
        }
    }

    pub fn with_spec(config: PlaybackConfig, spec: SimulationSpec) -> Self {
        let mut c = Self::new(config);
        c.build(spec);
        c
    }

    // ─────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────

    /// Replace the step sequence. Any running timer is invalidated first.
    pub fn build(&mut self, spec: SimulationSpec) {
        self.cancel_timer();
        self.trajectory = generate(&spec);
        debug!(
            kind = spec.kind().label(),
            steps = self.trajectory.len(),
            "built step sequence"
        );
        self.spec = Some(spec);
        self.move_cursor(None);
    }

    /// Advance one step. Stepping by hand while playing pauses first.
    /// Returns whether the cursor moved.
    pub fn step_forward(&mut self) -> bool {
        if self.state.is_playing {
            self.cancel_timer();
        }
        match self.next_cursor() {
            Some(next) => {
                self.move_cursor(Some(next));
                true
            }
            None => false,
        }
    }

    /// Start autoplay. Returns a ticket for the caller's timer, or `None` when
    /// already playing or when there is nothing left to play.
    pub fn play(&mut self) -> Option<TimerTicket> {
        if self.state.is_playing || self.next_cursor().is_none() {
            return None;
        }
        self.state.is_playing = true;
        Some(TimerTicket {
            generation: self.generation,
            interval: self.interval(),
        })
    }

    pub fn pause(&mut self) {
        if self.state.is_playing {
            self.cancel_timer();
        }
    }

    pub fn jump_to_end(&mut self) {
        self.cancel_timer();
        self.move_cursor(self.trajectory.last_index());
    }

    /// Move to `position` (`-1` = before the first step), clamped to the sequence.
    pub fn scrub_to(&mut self, position: isize) {
        self.cancel_timer();
        let cursor = match (usize::try_from(position), self.trajectory.last_index()) {
            (Ok(p), Some(last)) => Some(p.min(last)),
            _ => None,
        };
        self.move_cursor(cursor);
    }

    pub fn reset(&mut self) {
        self.cancel_timer();
        self.move_cursor(None);
    }

    /// Called by the owner of the timer once per interval.
    pub fn tick(&mut self, ticket: TimerTicket) -> TickOutcome {
        if !self.state.is_playing || ticket.generation != self.generation {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                "dropping stale tick"
            );
            return TickOutcome::Stale;
        }

        let Some(next) = self.next_cursor() else {
            self.cancel_timer();
            return TickOutcome::Stale;
        };
        self.move_cursor(Some(next));

        if Some(next) == self.trajectory.last_index() {
            self.cancel_timer();
            TickOutcome::Completed { cursor: next }
        } else {
            TickOutcome::Advanced { cursor: next }
        }
    }

    /// The owner is going away; no outstanding ticket may fire afterwards.
    pub fn teardown(&mut self) {
        self.cancel_timer();
    }

    /// New intervals apply to the next `play()`.
    pub fn set_config(&mut self, config: PlaybackConfig) {
        self.config = config;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Read side
    // ─────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn cursor(&self) -> Option<usize> {
        self.state.cursor
    }

    pub fn position(&self) -> isize {
        self.state.position()
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    pub fn phase(&self) -> PlaybackPhase {
        if self.state.is_playing {
            return PlaybackPhase::Playing;
        }
        match self.state.cursor {
            None => PlaybackPhase::Idle,
            Some(c) if Some(c) == self.trajectory.last_index() => PlaybackPhase::Complete,
            Some(_) => PlaybackPhase::Stepped,
        }
    }

    pub fn view(&self) -> &DerivedView {
        &self.view
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn spec(&self) -> Option<&SimulationSpec> {
        self.spec.as_ref()
    }

    pub fn kind(&self) -> SimulationKind {
        self.trajectory.kind()
    }

    pub fn config(&self) -> PlaybackConfig {
        self.config
    }

    pub fn interval(&self) -> Duration {
        self.config.interval(self.kind())
    }

    pub fn total_steps(&self) -> usize {
        self.trajectory.len()
    }

    /// Fraction of steps applied, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        let total = self.trajectory.len();
        if total == 0 {
            return 0.0;
        }
        self.state.cursor.map_or(0.0, |c| (c + 1) as f64 / total as f64)
    }

    /// Whole-run verdict; optimization runs only.
    pub fn verdict(&self) -> Option<Outcome> {
        match &self.trajectory {
            Trajectory::Optimization(run) => Some(run.outcome()),
            Trajectory::Counting(_) => None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn next_cursor(&self) -> Option<usize> {
        let last = self.trajectory.last_index()?;
        match self.state.cursor {
            None => Some(0),
            Some(c) if c < last => Some(c + 1),
            Some(_) => None,
        }
    }

    fn cancel_timer(&mut self) {
        self.state.is_playing = false;
        self.generation = self.generation.wrapping_add(1);
    }

    fn move_cursor(&mut self, cursor: Option<usize>) {
        let cursor = match (cursor, self.trajectory.last_index()) {
            (Some(c), Some(last)) => Some(c.min(last)),
            _ => None,
        };
        self.state.cursor = cursor;
        self.view = project(&self.trajectory, cursor);
        trace!(position = self.state.position(), "cursor moved");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::Prng;
    use crate::spec::{lesson_specs, CountingSpec, OptimizationSpec, Preset};

    fn hello() -> PlaybackController {
        PlaybackController::with_spec(
            PlaybackConfig::default(),
            CountingSpec::new("hello world").into(),
        )
    }

    #[test]
    fn starts_idle_and_steps_to_complete() {
        let mut c = hello();
        assert_eq!(c.phase(), PlaybackPhase::Idle);
        assert_eq!(c.position(), -1);

        assert!(c.step_forward());
        assert_eq!(c.phase(), PlaybackPhase::Stepped);
        assert_eq!(c.cursor(), Some(0));

        for _ in 0..20 {
            c.step_forward();
        }
        assert_eq!(c.cursor(), Some(9));
        assert_eq!(c.phase(), PlaybackPhase::Complete);
        assert!(!c.step_forward());
        assert_eq!(c.progress(), 1.0);
    }

    #[test]
    fn ticks_advance_until_complete_then_go_stale() {
        let mut c = hello();
        let ticket = c.play().expect("ticket");
        assert_eq!(c.phase(), PlaybackPhase::Playing);
        assert_eq!(ticket.interval(), Duration::from_millis(380));

        let mut advanced = 0;
        loop {
            match c.tick(ticket) {
                TickOutcome::Advanced { .. } => advanced += 1,
                TickOutcome::Completed { cursor } => {
                    assert_eq!(cursor, 9);
                    break;
                }
                TickOutcome::Stale => panic!("ticket went stale early"),
            }
        }
        assert_eq!(advanced, 9);
        assert_eq!(c.phase(), PlaybackPhase::Complete);
        assert!(!c.is_playing());
        assert_eq!(c.tick(ticket), TickOutcome::Stale);
    }

    #[test]
    fn play_while_playing_issues_no_second_timer() {
        let mut c = hello();
        let first = c.play().unwrap();
        assert!(c.play().is_none());
        assert!(c.tick(first).keeps_running());
    }

    #[test]
    fn late_tick_after_build_is_ignored() {
        let mut c = hello();
        let old = c.play().unwrap();
        c.tick(old);
        c.build(OptimizationSpec::running_example(0.02).into());
        assert_eq!(c.tick(old), TickOutcome::Stale);
        assert_eq!(c.position(), -1);
        assert_eq!(c.view().applied_steps(), 0);
    }

    #[test]
    fn fresh_ticket_after_rebuild_leaves_old_one_dead() {
        let mut c = PlaybackController::with_spec(PlaybackConfig::default(), Preset::Good.spec());
        let old = c.play().unwrap();
        assert!(c.tick(old).keeps_running());
        assert!(c.tick(old).keeps_running());

        c.build(Preset::Hello.spec());
        for _ in 0..5 {
            assert_eq!(c.tick(old), TickOutcome::Stale);
        }
        assert_eq!(c.position(), -1);

        let fresh = c.play().unwrap();
        assert_eq!(c.tick(old), TickOutcome::Stale);
        assert_eq!(c.tick(fresh), TickOutcome::Advanced { cursor: 0 });
    }

    #[test]
    fn cursor_stays_in_bounds_under_random_events() {
        let specs = lesson_specs();
        let mut rng = Prng::new(0xC0FFEE);
        let mut c = PlaybackController::new(PlaybackConfig::default());
        let mut tickets: Vec<TimerTicket> = Vec::new();

        for _ in 0..20_000 {
            match rng.gen_range_usize(0, 9) {
                0 => {
                    let i = rng.gen_range_usize(0, specs.len());
                    c.build(specs[i].clone());
                }
                1 => {
                    c.step_forward();
                }
                2 => {
                    if let Some(t) = c.play() {
                        tickets.push(t);
                    }
                }
                3 => c.pause(),
                4 => c.jump_to_end(),
                5 => {
                    let p = rng.gen_range_usize(0, 80) as isize - 20;
                    c.scrub_to(p);
                }
                6 => c.reset(),
                _ => {
                    if !tickets.is_empty() {
                        let i = rng.gen_range_usize(0, tickets.len());
                        let before = c.position();
                        if let TickOutcome::Stale = c.tick(tickets[i]) {
                            assert_eq!(c.position(), before);
                        }
                    }
                }
            }

            let len = c.total_steps() as isize;
            let pos = c.position();
            assert!(pos >= -1 && pos <= len - 1, "position {pos} of {len}");
            assert_eq!(c.view().applied_steps() as isize, pos + 1);
            assert!(!(c.is_playing() && len == 0));
        }
    }

    #[test]
    fn verdict_holds_through_autoplay() {
        let mut c = PlaybackController::with_spec(
            PlaybackConfig::default(),
            OptimizationSpec::running_example(0.02).into(),
        );
        let ticket = c.play().unwrap();
        loop {
            assert_eq!(c.verdict(), Some(Outcome::Converged));
            if let TickOutcome::Completed { cursor } = c.tick(ticket) {
                assert_eq!(cursor, 39);
                break;
            }
        }
        assert_eq!(c.view().as_descent().unwrap().losses[0], 49.0);
    }

    #[test]
    fn every_cancelling_event_invalidates_the_ticket() {
        let events: [fn(&mut PlaybackController); 5] = [
            |c| c.pause(),
            |c| c.reset(),
            |c| c.jump_to_end(),
            |c| c.scrub_to(3),
            |c| c.teardown(),
        ];
        for event in events {
            let mut c = hello();
            let ticket = c.play().unwrap();
            event(&mut c);
            let before = c.position();
            assert_eq!(c.tick(ticket), TickOutcome::Stale);
            assert_eq!(c.position(), before);
            assert!(!c.is_playing());
        }
    }

    #[test]
    fn pause_then_play_issues_a_fresh_ticket() {
        let mut c = hello();
        let first = c.play().unwrap();
        c.tick(first);
        c.pause();
        assert_eq!(c.phase(), PlaybackPhase::Stepped);
        let second = c.play().unwrap();
        assert_ne!(first, second);
        assert_eq!(c.tick(second), TickOutcome::Advanced { cursor: 1 });
    }

    #[test]
    fn manual_step_while_playing_pauses() {
        let mut c = hello();
        let ticket = c.play().unwrap();
        assert!(c.step_forward());
        assert!(!c.is_playing());
        assert_eq!(c.tick(ticket), TickOutcome::Stale);
        assert_eq!(c.cursor(), Some(0));
    }

    #[test]
    fn scrub_clamps_both_ends() {
        let mut c = hello();
        c.scrub_to(-40);
        assert_eq!(c.position(), -1);
        c.scrub_to(400);
        assert_eq!(c.cursor(), Some(9));
        assert_eq!(c.phase(), PlaybackPhase::Complete);
        c.scrub_to(4);
        assert_eq!(c.view().applied_steps(), 5);
    }

    #[test]
    fn empty_sequence_has_nothing_to_play() {
        let mut c = PlaybackController::with_spec(
            PlaybackConfig::default(),
            CountingSpec::new("!!!").into(),
        );
        assert_eq!(c.total_steps(), 0);
        assert!(c.play().is_none());
        assert!(!c.step_forward());
        c.jump_to_end();
        c.scrub_to(5);
        assert_eq!(c.phase(), PlaybackPhase::Idle);
        assert_eq!(c.progress(), 0.0);
    }

    #[test]
    fn play_at_end_is_a_no_op() {
        let mut c = hello();
        c.jump_to_end();
        assert!(c.play().is_none());
        assert_eq!(c.phase(), PlaybackPhase::Complete);
    }

    #[test]
    fn optimization_interval_and_verdict() {
        let c = PlaybackController::with_spec(
            PlaybackConfig::default().with_optimization_interval_ms(5),
            OptimizationSpec::running_example(1.5).into(),
        );
        // Clamped to the floor.
        assert_eq!(c.interval(), Duration::from_millis(MIN_INTERVAL_MS as u64));
        assert_eq!(c.verdict(), Some(Outcome::Diverged));
        assert_eq!(hello().verdict(), None);
    }
}
