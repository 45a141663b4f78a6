//! Default project handle backed by the descriptor file.
//!
//! The handle does not interpret the descriptor. It tracks the file's SHA-256
//! and announces a `ProjectRefreshed` event whenever the digest moves. The
//! first refresh only records a baseline: a new handle is already covered by
//! the `CacheRebuilt` event of its generation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::cache::ManifestChangedEvent;

use super::{ProjectContext, ProjectError, ProjectFactory, ProjectHandle, ProjectResult};

/// Project handle that watches its descriptor's content hash.
#[derive(Debug)]
pub struct DescriptorProject {
    root: PathBuf,
    descriptor: PathBuf,
    context: ProjectContext,
    last_sha: Mutex<Option<String>>,
    disposed: AtomicBool,
}

impl DescriptorProject {
    pub fn new(root: PathBuf, descriptor_file: &str, context: ProjectContext) -> Self {
        let descriptor = root.join(descriptor_file);
        Self {
            root,
            descriptor,
            context,
            last_sha: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Hex SHA-256 of the descriptor as of the last refresh.
    pub fn descriptor_sha(&self) -> Option<String> {
        self.last_sha.lock().clone()
    }

    pub fn descriptor_path(&self) -> &Path {
        &self.descriptor
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ProjectHandle for DescriptorProject {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn refresh(&self) -> ProjectResult<()> {
        if self.is_disposed() {
            return Err(ProjectError::Disposed {
                root: self.root.clone(),
            });
        }

        let bytes = tokio::fs::read(&self.descriptor)
            .await
            .map_err(|source| ProjectError::Io {
                path: self.descriptor.clone(),
                source,
            })?;
        let sha = format!("{:x}", Sha256::digest(&bytes));

        let changed = {
            let mut last = self.last_sha.lock();
            let changed = last.as_deref().is_some_and(|previous| previous != sha);
            *last = Some(sha);
            changed
        };

        if changed {
            crate::debug_event!("project", "refreshed", "{}", self.root.display());
            self.context
                .observers
                .notify(&ManifestChangedEvent::ProjectRefreshed {
                    generation: self.context.generation,
                    root: self.root.clone(),
                });
        }

        Ok(())
    }

    async fn dispose(&self) -> ProjectResult<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Err(ProjectError::Disposed {
                root: self.root.clone(),
            });
        }
        crate::debug_event!("project", "disposed", "{}", self.root.display());
        Ok(())
    }
}

/// Builds [`DescriptorProject`] handles.
#[derive(Debug, Clone)]
pub struct DescriptorFactory {
    descriptor_file: String,
}

impl DescriptorFactory {
    pub fn new(descriptor_file: impl Into<String>) -> Self {
        Self {
            descriptor_file: descriptor_file.into(),
        }
    }
}

#[async_trait]
impl ProjectFactory for DescriptorFactory {
    async fn create(
        &self,
        root: &Path,
        context: ProjectContext,
    ) -> ProjectResult<Arc<dyn ProjectHandle>> {
        let descriptor = root.join(&self.descriptor_file);
        if !tokio::fs::try_exists(&descriptor).await.unwrap_or(false) {
            return Err(ProjectError::Init {
                root: root.to_path_buf(),
                reason: format!("{} is missing", descriptor.display()),
            });
        }

        Ok(Arc::new(DescriptorProject::new(
            root.to_path_buf(),
            &self.descriptor_file,
            context,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ObserverRegistry;
    use std::fs;
    use tempfile::TempDir;

    fn context(observers: &Arc<ObserverRegistry>) -> ProjectContext {
        ProjectContext {
            generation: 7,
            observers: Arc::clone(observers),
        }
    }

    fn counting(observers: &Arc<ObserverRegistry>) -> Arc<Mutex<Vec<ManifestChangedEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        observers.subscribe(Arc::new(move |event: &ManifestChangedEvent| {
            sink.lock().push(event.clone())
        }));
        seen
    }

    #[tokio::test]
    async fn test_refresh_announces_only_on_change() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("dbt_project.yml"), "name: a\n").unwrap();
        let observers = Arc::new(ObserverRegistry::new());
        let seen = counting(&observers);

        let project = DescriptorProject::new(
            temp_dir.path().to_path_buf(),
            "dbt_project.yml",
            context(&observers),
        );

        // First refresh records the baseline, the second finds nothing new
        project.refresh().await.unwrap();
        project.refresh().await.unwrap();
        assert!(seen.lock().is_empty());
        let first_sha = project.descriptor_sha().unwrap();

        fs::write(temp_dir.path().join("dbt_project.yml"), "name: b\n").unwrap();
        project.refresh().await.unwrap();

        assert_eq!(seen.lock().len(), 1);
        assert_ne!(project.descriptor_sha().unwrap(), first_sha);
        assert_eq!(
            seen.lock()[0],
            ManifestChangedEvent::ProjectRefreshed {
                generation: 7,
                root: temp_dir.path().to_path_buf(),
            }
        );
    }

    #[tokio::test]
    async fn test_refresh_after_dispose_fails() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("dbt_project.yml"), "name: a\n").unwrap();
        let observers = Arc::new(ObserverRegistry::new());
        let project = DescriptorProject::new(
            temp_dir.path().to_path_buf(),
            "dbt_project.yml",
            context(&observers),
        );

        project.dispose().await.unwrap();

        assert!(project.is_disposed());
        assert!(matches!(
            project.refresh().await,
            Err(ProjectError::Disposed { .. })
        ));
        assert!(project.dispose().await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_reports_missing_descriptor() {
        let temp_dir = TempDir::new().unwrap();
        let observers = Arc::new(ObserverRegistry::new());
        let project = DescriptorProject::new(
            temp_dir.path().to_path_buf(),
            "dbt_project.yml",
            context(&observers),
        );

        assert!(matches!(project.refresh().await, Err(ProjectError::Io { .. })));
    }

    #[tokio::test]
    async fn test_factory_rejects_root_without_descriptor() {
        let temp_dir = TempDir::new().unwrap();
        let observers = Arc::new(ObserverRegistry::new());
        let factory = DescriptorFactory::new("dbt_project.yml");

        let result = factory.create(temp_dir.path(), context(&observers)).await;

        assert!(matches!(result, Err(ProjectError::Init { .. })));
    }
}
