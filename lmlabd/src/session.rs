//! One playback session per client connection.
//!
//! The controller lives behind a mutex shared with at most one autoplay task.
//! The task owns a timer ticket and stops on its own once a tick comes back
//! stale, but every cancelling request also aborts it so no timer outlives
//! the event that cancelled it.

use std::sync::Arc;

use lmlab::observer::ControllerAdapter;
use lmlab::prng::Prng;
use lmlab::spec::SimulationKind;
use lmlab::{PlaybackConfig, PlaybackController, Preset, SimulationSpec, TickOutcome};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::DaemonError;
use crate::protocol::{Request, Response};

pub struct Session {
    controller: Arc<Mutex<PlaybackController>>,
    autoplay: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(config: PlaybackConfig) -> Self {
        Self {
            controller: Arc::new(Mutex::new(PlaybackController::new(config))),
            autoplay: None,
        }
    }

    pub async fn handle(&mut self, request: Request) -> Response {
        match self.dispatch(request).await {
            Ok(resp) => resp,
            Err(e) => Response::error(e.to_string()),
        }
    }

    async fn dispatch(&mut self, request: Request) -> Result<Response, DaemonError> {
        let resp = match request {
            Request::GetState => self.state().await,
            Request::Build { spec } => {
                spec.validate()?;
                self.build(spec).await
            }
            Request::Preset { name } => {
                let preset =
                    Preset::from_label(&name).ok_or(DaemonError::UnknownPreset(name))?;
                self.build(preset.spec()).await
            }
            Request::StepForward => {
                let moved = self.cancelling(|c| c.step_forward()).await;
                if moved {
                    self.state().await
                } else {
                    Response::success("Already at the last step")
                }
            }
            Request::Play => {
                let playing = self.controller.lock().await.is_playing();
                if playing {
                    Response::success("Already playing")
                } else if self.play().await {
                    Response::success("Playing")
                } else {
                    Response::success("Nothing to play")
                }
            }
            Request::Pause => {
                self.cancelling(|c| c.pause()).await;
                Response::success("Paused")
            }
            Request::JumpToEnd => {
                self.cancelling(|c| c.jump_to_end()).await;
                self.state().await
            }
            Request::ScrubTo { position } => {
                self.cancelling(|c| c.scrub_to(position)).await;
                self.state().await
            }
            Request::Reset => {
                self.cancelling(|c| c.reset()).await;
                self.state().await
            }
            Request::SetInterval { ms } => {
                let mut c = self.controller.lock().await;
                let config = match c.kind() {
                    SimulationKind::Counting => c.config().with_counting_interval_ms(ms),
                    SimulationKind::Optimization => c.config().with_optimization_interval_ms(ms),
                };
                c.set_config(config);
                let applied = config.interval_ms(c.kind());
                info!("{} interval set to {} ms", c.kind().label(), applied);
                Response::success(format!(
                    "{} interval set to {} ms",
                    c.kind().label(),
                    applied
                ))
            }
            Request::Sample { start, len, seed } => {
                let c = self.controller.lock().await;
                let Some(view) = c.view().as_counting() else {
                    return Ok(Response::error("Sampling needs a counting simulation"));
                };
                if view.vocabulary.index_of(start).is_none() {
                    return Ok(Response::error(format!(
                        "Start symbol {start:?} is not in the vocabulary"
                    )));
                }
                let text = view.sample(start, len, &mut Prng::new(seed));
                Response::Sample { text }
            }
        };
        Ok(resp)
    }

    pub async fn state(&self) -> Response {
        let c = self.controller.lock().await;
        Response::State(Box::new(ControllerAdapter::new(&c).snapshot()))
    }

    async fn build(&mut self, spec: SimulationSpec) -> Response {
        let kind = spec.kind();
        let steps = self
            .cancelling(move |c| {
                c.build(spec);
                c.total_steps()
            })
            .await;
        Response::success(format!("Built {} sequence with {} steps", kind.label(), steps))
    }

    /// Run an event that cancels autoplay, then make sure the task is gone.
    async fn cancelling<R>(&mut self, event: impl FnOnce(&mut PlaybackController) -> R) -> R {
        let out = {
            let mut c = self.controller.lock().await;
            event(&mut c)
        };
        self.stop_autoplay();
        out
    }

    /// Returns whether a new autoplay task was started.
    async fn play(&mut self) -> bool {
        let ticket = self.controller.lock().await.play();
        let Some(ticket) = ticket else {
            return false;
        };

        self.stop_autoplay();
        let controller = Arc::clone(&self.controller);
        self.autoplay = Some(tokio::spawn(async move {
            let mut interval = time::interval(ticket.interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let outcome = controller.lock().await.tick(ticket);
                match outcome {
                    TickOutcome::Advanced { .. } => {}
                    TickOutcome::Completed { cursor } => {
                        debug!(cursor, "autoplay complete");
                        break;
                    }
                    TickOutcome::Stale => break,
                }
            }
        }));
        true
    }

    fn stop_autoplay(&mut self) {
        if let Some(handle) = self.autoplay.take() {
            handle.abort();
        }
    }

    /// Client went away: invalidate any ticket and stop the timer.
    pub async fn close(&mut self) {
        self.cancelling(|c| c.teardown()).await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_autoplay();
    }
}
