//! Project discovery.
//!
//! Walks a workspace root looking for descriptor files. The vendored-modules
//! directory is pruned during traversal, so installed packages are never
//! entered, and matches below an isolated-environment directory
//! (`site-packages`) are dropped afterwards.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;

use crate::config::DiscoveryConfig;

use super::error::DiscoveryError;

/// Finds project roots below workspace roots.
#[derive(Debug, Clone)]
pub struct ProjectDiscovery {
    descriptor_file: String,
    modules_dir: String,
    ignore_token: String,
    exclude_patterns: Vec<String>,
    respect_gitignore: bool,
}

impl ProjectDiscovery {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            descriptor_file: config.descriptor_file.clone(),
            modules_dir: config.modules_dir.clone(),
            ignore_token: config.ignore_token.clone(),
            exclude_patterns: config.exclude_patterns.clone(),
            respect_gitignore: config.respect_gitignore,
        }
    }

    /// File name marking a project root.
    pub fn descriptor_file(&self) -> &str {
        &self.descriptor_file
    }

    /// Name of the vendored-modules directory.
    pub fn modules_dir(&self) -> &str {
        &self.modules_dir
    }

    /// Discover project roots in every workspace root, in the order given.
    ///
    /// Roots found under two workspace roots are reported twice; the cache
    /// collapses them by path.
    pub fn discover_all(&self, workspace_roots: &[PathBuf]) -> Result<Vec<PathBuf>, DiscoveryError> {
        let mut found = Vec::new();
        for root in workspace_roots {
            found.extend(self.discover(root)?);
        }
        Ok(found)
    }

    /// Discover project roots below a single workspace root.
    ///
    /// Results are deduplicated and sorted.
    pub fn discover(&self, workspace_root: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
        let metadata =
            std::fs::metadata(workspace_root).map_err(|source| DiscoveryError::RootUnreadable {
                path: workspace_root.to_path_buf(),
                source,
            })?;
        if !metadata.is_dir() {
            return Err(DiscoveryError::NotADirectory {
                path: workspace_root.to_path_buf(),
            });
        }

        let mut builder = WalkBuilder::new(workspace_root);
        builder
            .standard_filters(false)
            .git_ignore(self.respect_gitignore)
            .git_global(self.respect_gitignore)
            .git_exclude(self.respect_gitignore)
            .require_git(false)
            .follow_links(false);

        if !self.exclude_patterns.is_empty() {
            let mut overrides = OverrideBuilder::new(workspace_root);
            for pattern in &self.exclude_patterns {
                overrides
                    .add(&format!("!{pattern}"))
                    .map_err(|e| DiscoveryError::InvalidPattern {
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    })?;
            }
            let overrides = overrides
                .build()
                .map_err(|e| DiscoveryError::InvalidPattern {
                    pattern: self.exclude_patterns.join(", "),
                    reason: e.to_string(),
                })?;
            builder.overrides(overrides);
        }

        // Prune vendored packages from the traversal itself
        let modules_dir = self.modules_dir.clone();
        builder.filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            !(entry.depth() > 0 && is_dir && entry.file_name() == OsStr::new(&modules_dir))
        });

        let mut roots = BTreeSet::new();
        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("[discovery] skipping unreadable entry: {e}");
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            if entry.file_name() != OsStr::new(&self.descriptor_file) {
                continue;
            }
            if self.in_isolated_env(workspace_root, entry.path()) {
                crate::debug_event!("discovery", "ignored", "{}", entry.path().display());
                continue;
            }
            if let Some(parent) = entry.path().parent() {
                roots.insert(parent.to_path_buf());
            }
        }

        crate::debug_event!(
            "discovery",
            "scanned",
            "{} projects in {}",
            roots.len(),
            workspace_root.display()
        );

        Ok(roots.into_iter().collect())
    }

    /// True when a path below the workspace root crosses an isolated-environment segment.
    fn in_isolated_env(&self, workspace_root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(workspace_root).unwrap_or(path);
        relative
            .components()
            .any(|c| matches!(c, Component::Normal(name) if name == OsStr::new(&self.ignore_token)))
    }
}

impl Default for ProjectDiscovery {
    fn default() -> Self {
        Self::new(&DiscoveryConfig::default())
    }
}
