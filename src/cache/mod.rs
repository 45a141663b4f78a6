//! Project cache coordinator.
//!
//! # Architecture
//!
//! ```text
//! WorkspaceWatcher ──> ProjectCache::rebuild_and_refresh()
//!                        ├─ ProjectDiscovery (blocking walk)
//!                        ├─ dispose old generation
//!                        ├─ ProjectFactory -> new handles
//!                        ├─ swap CacheSnapshot
//!                        └─ ObserverRegistry::notify(CacheRebuilt)
//!
//! host edit ──> ProjectCache::source_file_changed() ──> RunnerBinding
//! ```

mod coordinator;
mod error;
mod events;
mod observers;
mod snapshot;

pub use coordinator::{ProjectCache, ProjectCacheBuilder, RebuildSummary};
pub use error::{CacheError, CacheResult};
pub use events::{ManifestChangedEvent, SourceFileChangedEvent};
pub use observers::{ManifestObserver, ObserverRegistry, Subscription, SubscriptionId};
pub use snapshot::CacheSnapshot;
