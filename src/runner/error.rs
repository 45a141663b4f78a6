//! Error types for the tool-runner binding.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to start runner for {interpreter}: {reason}")]
    Init { interpreter: PathBuf, reason: String },

    #[error("Failed to stop runner: {reason}")]
    Dispose { reason: String },
}

pub type RunnerResult<T> = Result<T, RunnerError>;
