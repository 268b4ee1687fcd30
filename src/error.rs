use std::io;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("invalid data format: {0}")]
    InvalidResponse(String),

    #[error("invalid OUI table: {0}")]
    InvalidOui(String),

    #[error("invalid traffic dataset: {0}")]
    Dataset(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
