//! Observer registry for cache-changed events.
//!
//! Delivery is synchronous and follows registration order. Every callback
//! runs inside `catch_unwind`, so one panicking observer is logged and
//! skipped while the rest still receive the event.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::events::ManifestChangedEvent;

/// Receives cache-changed events.
pub trait ManifestObserver: Send + Sync {
    fn on_manifest_changed(&self, event: &ManifestChangedEvent);
}

impl<F> ManifestObserver for F
where
    F: Fn(&ManifestChangedEvent) + Send + Sync,
{
    fn on_manifest_changed(&self, event: &ManifestChangedEvent) {
        self(event)
    }
}

/// Identifies one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Ordered list of observers.
#[derive(Default)]
pub struct ObserverRegistry {
    next_id: AtomicU64,
    observers: RwLock<Vec<(SubscriptionId, Arc<dyn ManifestObserver>)>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observer. It receives every event raised after this call.
    pub fn subscribe(self: &Arc<Self>, observer: Arc<dyn ManifestObserver>) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        crate::debug_event!("observers", "subscribed", "{id:?}");

        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Remove an observer. Returns false when it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        let removed = observers.len() != before;
        if removed {
            crate::debug_event!("observers", "unsubscribed", "{id:?}");
        }
        removed
    }

    /// Deliver an event to every observer in registration order.
    ///
    /// Returns how many observers handled it without panicking.
    pub fn notify(&self, event: &ManifestChangedEvent) -> usize {
        // Snapshot so callbacks may subscribe or unsubscribe without deadlocking
        let observers: Vec<_> = self
            .observers
            .read()
            .iter()
            .map(|(id, observer)| (*id, Arc::clone(observer)))
            .collect();

        let mut delivered = 0;
        for (id, observer) in observers {
            match catch_unwind(AssertUnwindSafe(|| observer.on_manifest_changed(event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!("[observers] observer {id:?} panicked: {reason}");
                }
            }
        }

        crate::debug_event!("observers", "delivered", "{event:?} to {delivered} observers");
        delivered
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }
}

/// Handle returned by [`ObserverRegistry::subscribe`].
///
/// Dropping it keeps the observer registered; call [`Subscription::unsubscribe`]
/// to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<ObserverRegistry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the observer. Returns false when the registry is gone or the
    /// observer was already removed.
    pub fn unsubscribe(self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.unsubscribe(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn event() -> ManifestChangedEvent {
        ManifestChangedEvent::CacheRebuilt {
            generation: 1,
            added: vec![],
            removed: vec![],
            project_count: 0,
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Arc<dyn ManifestObserver> {
        let log = Arc::clone(log);
        Arc::new(move |_: &ManifestChangedEvent| log.lock().push(name))
    }

    #[test]
    fn test_delivery_follows_registration_order() {
        let registry = Arc::new(ObserverRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.subscribe(recorder(&log, "o1"));
        registry.subscribe(recorder(&log, "o2"));
        registry.subscribe(recorder(&log, "o3"));

        let delivered = registry.notify(&event());

        assert_eq!(delivered, 3);
        assert_eq!(*log.lock(), vec!["o1", "o2", "o3"]);
    }

    #[test]
    fn test_panicking_observer_does_not_block_others() {
        let registry = Arc::new(ObserverRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.subscribe(recorder(&log, "before"));
        registry.subscribe(Arc::new(|_: &ManifestChangedEvent| panic!("observer failure")));
        registry.subscribe(recorder(&log, "after"));

        let delivered = registry.notify(&event());

        assert_eq!(delivered, 2);
        assert_eq!(*log.lock(), vec!["before", "after"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let registry = Arc::new(ObserverRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = registry.subscribe(recorder(&log, "first"));
        registry.subscribe(recorder(&log, "second"));

        assert!(first.unsubscribe());
        registry.notify(&event());

        assert_eq!(*log.lock(), vec!["second"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let registry = Arc::new(ObserverRegistry::new());
        let subscription = registry.subscribe(Arc::new(|_: &ManifestChangedEvent| {}));
        drop(registry);

        assert!(!subscription.unsubscribe());
    }

    #[test]
    fn test_observer_can_subscribe_during_delivery() {
        let registry = Arc::new(ObserverRegistry::new());
        let inner = Arc::clone(&registry);
        registry.subscribe(Arc::new(move |_: &ManifestChangedEvent| {
            inner.subscribe(Arc::new(|_: &ManifestChangedEvent| {}));
        }));

        assert_eq!(registry.notify(&event()), 1);
        assert_eq!(registry.len(), 2);
    }
}
