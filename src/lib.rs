//! Deterministic stepwise simulations of tiny language-model lessons, with a
//! playback controller that replays them one step at a time.

#[path = "core/classify.rs"]
pub mod classify;

#[path = "core/engine.rs"]
pub mod engine;

#[path = "core/playback.rs"]
pub mod playback;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/projector.rs"]
pub mod projector;

#[path = "core/spec.rs"]
pub mod spec;

#[path = "core/vocab.rs"]
pub mod vocab;

pub mod observer;

pub use classify::{classify, Outcome};
pub use engine::{generate, Trajectory};
pub use playback::{PlaybackConfig, PlaybackController, PlaybackPhase, TickOutcome, TimerTicket};
pub use projector::{project, DerivedView};
pub use spec::{CountingSpec, OptimizationSpec, Preset, SimulationSpec};
