//! The project cache coordinator.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::config::Settings;
use crate::project::{
    DescriptorFactory, ProjectContext, ProjectDiscovery, ProjectFactory, ProjectHandle, resolver,
};
use crate::runner::RunnerBinding;

use super::error::{CacheError, CacheResult};
use super::events::{ManifestChangedEvent, SourceFileChangedEvent};
use super::observers::{ManifestObserver, ObserverRegistry, Subscription};
use super::snapshot::CacheSnapshot;

/// Outcome of a successful rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildSummary {
    pub generation: u64,
    pub project_count: usize,
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

/// Owns the mapping from project root to project handle.
///
/// Constructed once at startup and shared as `Arc<ProjectCache>`. Rebuilds
/// and refreshes are serialized by an internal mutex; path lookups read the
/// currently installed snapshot and never wait.
///
/// Operations that need a cache log an error and degrade to "nothing
/// happened" when called before the first rebuild.
pub struct ProjectCache {
    workspace_roots: RwLock<Vec<PathBuf>>,
    discovery: ProjectDiscovery,
    factory: Arc<dyn ProjectFactory>,
    observers: Arc<ObserverRegistry>,
    runner: RunnerBinding,
    snapshot: RwLock<Option<Arc<CacheSnapshot>>>,
    generation: AtomicU64,
    /// Held for the whole of a rebuild or a refresh pass.
    rebuild: Mutex<()>,
}

impl ProjectCache {
    pub fn builder() -> ProjectCacheBuilder {
        ProjectCacheBuilder::new()
    }

    /// Cache configured from settings, using descriptor-backed project handles.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::builder()
            .workspace_roots(settings.workspace_roots.clone())
            .discovery(ProjectDiscovery::new(&settings.discovery))
            .factory(Arc::new(DescriptorFactory::new(
                settings.discovery.descriptor_file.clone(),
            )))
            .build()
    }

    /// Dispose the current generation, rediscover projects and install a new generation.
    ///
    /// Discovery runs first; if it fails the current generation is kept
    /// untouched. Otherwise every old handle is disposed before any new one
    /// is created, and the new generation becomes visible in one swap.
    /// With no workspace roots and no existing cache this does nothing.
    pub async fn create_manifests(&self) -> CacheResult<Option<RebuildSummary>> {
        let _guard = self.rebuild.lock().await;

        let roots = self.workspace_roots.read().clone();
        let previous = self.snapshot();
        if roots.is_empty() && previous.is_none() {
            crate::debug_event!("cache", "no workspace roots, nothing to build");
            return Ok(None);
        }

        let discovery = self.discovery.clone();
        let discovered = match tokio::task::spawn_blocking(move || discovery.discover_all(&roots))
            .await
        {
            Ok(Ok(discovered)) => discovered,
            Ok(Err(e)) => {
                tracing::error!("[cache] rebuild aborted, keeping previous generation: {e}");
                return Err(CacheError::from(e));
            }
            Err(e) => {
                tracing::error!("[cache] rebuild aborted, keeping previous generation: {e}");
                return Err(CacheError::TaskFailed {
                    reason: e.to_string(),
                });
            }
        };

        if let Some(previous) = &previous {
            dispose_all(previous).await;
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let context = ProjectContext {
            generation,
            observers: Arc::clone(&self.observers),
        };

        let mut projects: IndexMap<PathBuf, Arc<dyn ProjectHandle>> = IndexMap::new();
        for root in discovered {
            if projects.contains_key(&root) {
                continue;
            }
            match self.factory.create(&root, context.clone()).await {
                Ok(handle) => {
                    projects.insert(root, handle);
                }
                Err(e) => tracing::warn!("[cache] skipping project {}: {e}", root.display()),
            }
        }

        let (added, removed) = diff_roots(previous.as_deref(), &projects);
        let snapshot = Arc::new(CacheSnapshot::new(generation, projects));
        let project_count = snapshot.len();
        *self.snapshot.write() = Some(snapshot);

        crate::log_event!(
            "cache",
            "rebuilt",
            "generation {generation}: {project_count} projects (+{} -{})",
            added.len(),
            removed.len()
        );

        self.raise_manifest_changed_event(&ManifestChangedEvent::CacheRebuilt {
            generation,
            added: added.clone(),
            removed: removed.clone(),
            project_count,
        });

        Ok(Some(RebuildSummary {
            generation,
            project_count,
            added,
            removed,
        }))
    }

    /// Refresh every handle in the current generation.
    ///
    /// One failing project does not stop the others. Returns how many
    /// refreshed successfully; 0 with a logged error when no cache exists.
    pub async fn try_refresh_all(&self) -> usize {
        let _guard = self.rebuild.lock().await;

        let Some(snapshot) = self.snapshot() else {
            tracing::error!("[cache] refresh requested before the project cache was built");
            return 0;
        };
        if snapshot.is_empty() {
            crate::debug_event!("cache", "nothing to refresh", "generation {}", snapshot.generation());
            return 0;
        }

        let mut refreshed = 0;
        for handle in snapshot.handles() {
            match handle.refresh().await {
                Ok(()) => refreshed += 1,
                Err(e) => tracing::warn!("[cache] refresh failed for {}: {e}", handle.root().display()),
            }
        }

        crate::debug_event!(
            "cache",
            "refreshed",
            "{refreshed}/{} projects in generation {}",
            snapshot.len(),
            snapshot.generation()
        );
        refreshed
    }

    /// Rebuild followed by a refresh of the new generation.
    pub async fn rebuild_and_refresh(&self) -> CacheResult<Option<RebuildSummary>> {
        let summary = self.create_manifests().await?;
        if summary.is_some() {
            self.try_refresh_all().await;
        }
        Ok(summary)
    }

    /// Register an observer for cache-changed events.
    ///
    /// Registration does not depend on the cache; an observer added before
    /// the first rebuild simply hears nothing until that rebuild happens.
    pub fn add_provider(&self, observer: Arc<dyn ManifestObserver>) -> Subscription {
        if !self.has_cache() {
            crate::debug_event!("cache", "provider registered before first build");
        }
        self.observers.subscribe(observer)
    }

    /// Deliver an event to every observer, synchronously and in registration order.
    pub fn raise_manifest_changed_event(&self, event: &ManifestChangedEvent) -> usize {
        self.observers.notify(event)
    }

    /// Forward a source change to the tool runner. No-op without a runner.
    pub fn raise_source_file_changed_event(&self, event: &SourceFileChangedEvent) -> bool {
        let forwarded = self.runner.forward(event);
        if !forwarded {
            crate::debug_event!("cache", "no runner for", "{}", event.path.display());
        }
        forwarded
    }

    /// Resolve the owning project of an edited file and forward the change.
    pub fn source_file_changed(&self, path: &Path) -> bool {
        let project_root = self
            .snapshot()
            .and_then(|snapshot| snapshot.project_root_for(path).map(Path::to_path_buf));
        self.raise_source_file_changed_event(&SourceFileChangedEvent {
            path: path.to_path_buf(),
            project_root,
        })
    }

    /// Root of the project owning `path`.
    pub fn project_root(&self, path: &Path) -> Option<PathBuf> {
        let Some(snapshot) = self.snapshot() else {
            tracing::error!(
                "[cache] project lookup for {} before the project cache was built",
                path.display()
            );
            return None;
        };
        snapshot.project_root_for(path).map(Path::to_path_buf)
    }

    /// Name of the vendored package containing `path`, if any.
    pub fn package_name(&self, path: &Path) -> Option<String> {
        let Some(snapshot) = self.snapshot() else {
            tracing::error!(
                "[cache] package lookup for {} before the project cache was built",
                path.display()
            );
            return None;
        };
        let root = snapshot.project_root_for(path)?;
        resolver::package_name(path, root, self.discovery.modules_dir())
    }

    /// The currently installed generation.
    pub fn snapshot(&self) -> Option<Arc<CacheSnapshot>> {
        self.snapshot.read().clone()
    }

    pub fn has_cache(&self) -> bool {
        self.snapshot.read().is_some()
    }

    /// Generation id of the installed cache.
    pub fn generation(&self) -> Option<u64> {
        self.snapshot.read().as_ref().map(|s| s.generation())
    }

    /// Project roots of the installed generation.
    pub fn projects(&self) -> Vec<PathBuf> {
        self.snapshot()
            .map(|snapshot| snapshot.roots().map(Path::to_path_buf).collect())
            .unwrap_or_default()
    }

    pub fn workspace_roots(&self) -> Vec<PathBuf> {
        self.workspace_roots.read().clone()
    }

    /// Replace the workspace roots. Takes effect on the next rebuild.
    pub fn set_workspace_roots(&self, roots: Vec<PathBuf>) {
        crate::debug_event!("cache", "workspace roots", "{}", roots.len());
        *self.workspace_roots.write() = roots;
    }

    pub fn observers(&self) -> &Arc<ObserverRegistry> {
        &self.observers
    }

    pub fn runner(&self) -> &RunnerBinding {
        &self.runner
    }

    pub fn discovery(&self) -> &ProjectDiscovery {
        &self.discovery
    }

    /// Dispose the final generation and stop the runner.
    pub async fn shutdown(&self) {
        let _guard = self.rebuild.lock().await;
        let last = self.snapshot.write().take();
        if let Some(last) = last {
            dispose_all(&last).await;
        }
        self.runner.shutdown().await;
        crate::log_event!("cache", "shut down");
    }
}

async fn dispose_all(snapshot: &CacheSnapshot) {
    for handle in snapshot.handles() {
        if let Err(e) = handle.dispose().await {
            tracing::warn!("[cache] dispose failed for {}: {e}", handle.root().display());
        }
    }
    crate::debug_event!(
        "cache",
        "disposed",
        "generation {} ({} projects)",
        snapshot.generation(),
        snapshot.len()
    );
}

fn diff_roots(
    previous: Option<&CacheSnapshot>,
    current: &IndexMap<PathBuf, Arc<dyn ProjectHandle>>,
) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let added = current
        .keys()
        .filter(|root| !previous.is_some_and(|snapshot| snapshot.contains(root)))
        .cloned()
        .collect();
    let removed = previous
        .map(|snapshot| {
            snapshot
                .roots()
                .filter(|root| !current.contains_key(*root))
                .map(Path::to_path_buf)
                .collect()
        })
        .unwrap_or_default();

    (added, removed)
}

/// Builder for constructing a ProjectCache.
pub struct ProjectCacheBuilder {
    workspace_roots: Vec<PathBuf>,
    discovery: ProjectDiscovery,
    factory: Option<Arc<dyn ProjectFactory>>,
    runner: Option<RunnerBinding>,
    observers: Option<Arc<ObserverRegistry>>,
}

impl ProjectCacheBuilder {
    pub fn new() -> Self {
        Self {
            workspace_roots: Vec::new(),
            discovery: ProjectDiscovery::default(),
            factory: None,
            runner: None,
            observers: None,
        }
    }

    pub fn workspace_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.workspace_roots = roots;
        self
    }

    pub fn discovery(mut self, discovery: ProjectDiscovery) -> Self {
        self.discovery = discovery;
        self
    }

    /// Factory for project handles. Defaults to [`DescriptorFactory`].
    pub fn factory(mut self, factory: Arc<dyn ProjectFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Tool-runner binding. Defaults to a disabled binding.
    pub fn runner(mut self, runner: RunnerBinding) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn observers(mut self, observers: Arc<ObserverRegistry>) -> Self {
        self.observers = Some(observers);
        self
    }

    pub fn build(self) -> ProjectCache {
        let factory = self.factory.unwrap_or_else(|| {
            Arc::new(DescriptorFactory::new(self.discovery.descriptor_file()))
        });

        ProjectCache {
            workspace_roots: RwLock::new(self.workspace_roots),
            discovery: self.discovery,
            factory,
            observers: self.observers.unwrap_or_default(),
            runner: self.runner.unwrap_or_default(),
            snapshot: RwLock::new(None),
            generation: AtomicU64::new(0),
            rebuild: Mutex::new(()),
        }
    }
}

impl Default for ProjectCacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}
