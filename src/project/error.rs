//! Error types for project handles and discovery.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by project handles and their factories.
#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Project at {root} was already disposed")]
    Disposed { root: PathBuf },

    #[error("Failed to initialize project at {root}: {reason}")]
    Init { root: PathBuf, reason: String },
}

/// Errors that abort a discovery pass.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Cannot read workspace root {path}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Workspace root {path} is not a directory")]
    NotADirectory { path: PathBuf },

    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

pub type ProjectResult<T> = Result<T, ProjectError>;
