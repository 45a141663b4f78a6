//! Immutable cache generations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::project::{ProjectHandle, resolver};

/// One generation of the cache: project root to handle.
///
/// Snapshots never change once installed. Readers hold an `Arc` to the
/// generation they started with, so a concurrent rebuild cannot tear it.
pub struct CacheSnapshot {
    generation: u64,
    projects: IndexMap<PathBuf, Arc<dyn ProjectHandle>>,
}

impl CacheSnapshot {
    pub(crate) fn new(generation: u64, projects: IndexMap<PathBuf, Arc<dyn ProjectHandle>>) -> Self {
        Self {
            generation,
            projects,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Project roots in discovery order.
    pub fn roots(&self) -> impl Iterator<Item = &Path> {
        self.projects.keys().map(PathBuf::as_path)
    }

    pub fn contains(&self, root: &Path) -> bool {
        self.projects.contains_key(root)
    }

    pub fn handles(&self) -> impl Iterator<Item = &Arc<dyn ProjectHandle>> {
        self.projects.values()
    }

    /// Root of the project owning `path`.
    pub fn project_root_for(&self, path: &Path) -> Option<&Path> {
        resolver::project_root_for(path, self.roots())
    }
}

impl std::fmt::Debug for CacheSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSnapshot")
            .field("generation", &self.generation)
            .field("roots", &self.projects.keys().collect::<Vec<_>>())
            .finish()
    }
}
