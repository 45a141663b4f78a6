//! In-memory cache of dbt projects found in a set of workspace roots.
//!
//! The [`ProjectCache`] discovers projects, owns one handle per project,
//! rebuilds on structural change and notifies observers. The
//! [`WorkspaceWatcher`] drives rebuilds from file system events, and the
//! [`RunnerBinding`] forwards source edits to an optional tool runner.

pub mod cache;
pub mod config;
pub mod logging;
pub mod project;
pub mod runner;
pub mod watcher;

pub use cache::{
    CacheError, CacheSnapshot, ManifestChangedEvent, ManifestObserver, ObserverRegistry,
    ProjectCache, RebuildSummary, SourceFileChangedEvent, Subscription,
};
pub use config::Settings;
pub use project::{
    DescriptorFactory, DescriptorProject, ProjectContext, ProjectDiscovery, ProjectError,
    ProjectFactory, ProjectHandle,
};
pub use runner::{RunnerBinding, RunnerError, RunnerFactory, ToolRunner};
pub use watcher::{WatchError, WorkspaceWatcher};
