//! Error types for cache rebuilds.

use thiserror::Error;

use crate::project::DiscoveryError;

/// Errors that abort a rebuild. The previous generation stays installed.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Project discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Discovery task failed: {reason}")]
    TaskFailed { reason: String },
}

pub type CacheResult<T> = Result<T, CacheError>;
