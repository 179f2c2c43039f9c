use lmlab::observer::PlaybackSnapshot;
use lmlab::SimulationSpec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    GetState,
    Build { spec: SimulationSpec },
    Preset { name: String },
    StepForward,
    Play,
    Pause,
    JumpToEnd,
    ScrubTo { position: isize },
    Reset,
    /// Applies to the current simulation kind from the next `Play`.
    SetInterval { ms: u32 },
    Sample {
        start: char,
        #[serde(default = "default_sample_len")]
        len: usize,
        #[serde(default)]
        seed: u64,
    },
}

fn default_sample_len() -> usize {
    40
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Response {
    State(Box<PlaybackSnapshot>),
    Success { message: String },
    Sample { text: String },
    Error { message: String },
}

impl Response {
    pub fn success(message: impl Into<String>) -> Self {
        Response::Success {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}
