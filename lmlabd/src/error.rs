use lmlab::spec::SpecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid spec: {0}")]
    InvalidSpec(#[from] SpecError),

    #[error("unknown preset: {0}")]
    UnknownPreset(String),

    #[error("{0}")]
    Usage(String),
}
