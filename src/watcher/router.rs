//! Classifies file system events into rebuild decisions.
//!
//! Only direct children of a workspace root matter. Creations are debounced
//! per workspace root because a checkout or an archive extraction produces a
//! directory before its contents. Deletions rebuild immediately.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};

use super::debouncer::Debouncer;

/// What the watcher should do about an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    /// Rebuild now. Carries the entry that triggered it.
    Rebuild { trigger: PathBuf },

    /// A rebuild is scheduled once the workspace root goes quiet.
    Deferred { root: PathBuf },

    /// Not a top-level change of any workspace root.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Appeared,
    Vanished,
}

/// Routes events for a fixed set of workspace roots.
#[derive(Debug)]
pub struct ChangeRouter {
    /// Each root as configured and, when it differs, canonicalized.
    roots: Vec<(PathBuf, Option<PathBuf>)>,
    debouncer: Debouncer<PathBuf>,
}

impl ChangeRouter {
    pub fn new(roots: Vec<PathBuf>, quiescence: Duration) -> Self {
        let roots = roots
            .into_iter()
            .map(|root| {
                let canonical = root.canonicalize().ok().filter(|c| *c != root);
                (root, canonical)
            })
            .collect();

        Self {
            roots,
            debouncer: Debouncer::new(quiescence),
        }
    }

    /// Workspace roots this router cares about.
    pub fn roots(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(|(root, _)| root.as_path())
    }

    /// Classify one event. Deletion wins over creation when an event carries both.
    pub fn route(&mut self, event: &Event) -> WatchAction {
        let Some(change) = classify(&event.kind) else {
            return WatchAction::None;
        };

        let mut action = WatchAction::None;
        for path in &event.paths {
            let Some(root) = self.owning_root(path) else {
                continue;
            };

            match change {
                Change::Vanished => {
                    return WatchAction::Rebuild {
                        trigger: path.clone(),
                    };
                }
                Change::Appeared => {
                    self.debouncer.record(root.clone());
                    action = WatchAction::Deferred { root };
                }
            }
        }
        action
    }

    /// Workspace roots whose creations have settled.
    pub fn take_ready(&mut self) -> Vec<PathBuf> {
        self.debouncer.take_ready()
    }

    pub fn has_pending(&self) -> bool {
        self.debouncer.has_pending()
    }

    /// Workspace root whose direct child is `path`.
    fn owning_root(&self, path: &Path) -> Option<PathBuf> {
        let parent = path.parent()?;
        self.roots
            .iter()
            .find(|(root, canonical)| parent == root || canonical.as_deref() == Some(parent))
            .map(|(root, _)| root.clone())
    }
}

fn classify(kind: &EventKind) -> Option<Change> {
    match kind {
        EventKind::Create(_) => Some(Change::Appeared),
        EventKind::Remove(_) => Some(Change::Vanished),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(Change::Vanished),
        EventKind::Modify(ModifyKind::Name(_)) => Some(Change::Appeared),
        _ => None,
    }
}
