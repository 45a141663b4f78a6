//! Events produced by the project cache.

use std::path::PathBuf;

use serde::Serialize;

/// Something observers of the cache should react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManifestChangedEvent {
    /// A new cache generation was installed.
    CacheRebuilt {
        generation: u64,
        /// Roots present now but not in the previous generation.
        added: Vec<PathBuf>,
        /// Roots present in the previous generation but gone now.
        removed: Vec<PathBuf>,
        project_count: usize,
    },

    /// A project's derived state changed after a refresh.
    ProjectRefreshed { generation: u64, root: PathBuf },
}

impl ManifestChangedEvent {
    /// Generation the event belongs to.
    pub fn generation(&self) -> u64 {
        match self {
            Self::CacheRebuilt { generation, .. } | Self::ProjectRefreshed { generation, .. } => {
                *generation
            }
        }
    }
}

/// A source file inside a project was edited.
///
/// Forwarded opaquely to the tool runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFileChangedEvent {
    pub path: PathBuf,
    /// Owning project root, when the file belongs to a known project.
    pub project_root: Option<PathBuf>,
}
