//! Project units: discovery, path resolution and the per-project handle.
//!
//! A project is any directory holding the descriptor file (`dbt_project.yml`
//! by default). The cache owns one [`ProjectHandle`] per project root and
//! builds them through a [`ProjectFactory`].

pub mod descriptor;
pub mod discovery;
mod error;
pub mod resolver;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::ObserverRegistry;

pub use descriptor::{DescriptorFactory, DescriptorProject};
pub use discovery::ProjectDiscovery;
pub use error::{DiscoveryError, ProjectError, ProjectResult};
pub use resolver::{package_name, project_root_for};

/// One discovered project.
///
/// Handles belong to exactly one cache generation. They are disposed when the
/// next generation replaces them and are never reused afterwards.
#[async_trait]
pub trait ProjectHandle: Send + Sync {
    /// Directory containing the descriptor file.
    fn root(&self) -> &Path;

    /// Re-read and re-validate the project. Must be safe to call repeatedly.
    async fn refresh(&self) -> ProjectResult<()>;

    /// Release everything the handle holds.
    async fn dispose(&self) -> ProjectResult<()>;
}

/// Builds a fresh handle for a project root.
#[async_trait]
pub trait ProjectFactory: Send + Sync {
    async fn create(
        &self,
        root: &Path,
        context: ProjectContext,
    ) -> ProjectResult<Arc<dyn ProjectHandle>>;
}

/// What a handle gets from the cache that created it.
#[derive(Clone)]
pub struct ProjectContext {
    /// Generation the handle belongs to.
    pub generation: u64,
    /// Registry used to announce project-level changes.
    pub observers: Arc<ObserverRegistry>,
}

impl std::fmt::Debug for ProjectContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectContext")
            .field("generation", &self.generation)
            .field("observers", &self.observers.len())
            .finish()
    }
}
