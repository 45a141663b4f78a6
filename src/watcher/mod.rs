//! Workspace watcher for automatic cache rebuilds.
//!
//! # Architecture
//!
//! ```text
//! WorkspaceWatcher
//!   - Single notify::RecommendedWatcher (non-recursive, one watch per root)
//!   - ChangeRouter (top-level create/delete classification)
//!   - Debouncer (quiet period per workspace root)
//!         |
//!   ProjectCache::rebuild_and_refresh()
//! ```

mod debouncer;
mod error;
mod router;
mod workspace;

pub use debouncer::Debouncer;
pub use error::WatchError;
pub use router::{ChangeRouter, WatchAction};
pub use workspace::{WorkspaceWatcher, WorkspaceWatcherBuilder};
