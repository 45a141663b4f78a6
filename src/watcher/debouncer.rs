//! Quiet-period debouncing for file system events.
//!
//! A key becomes ready once no event has been recorded for it during the
//! configured window. Recording again resets its timer, so a burst of
//! events collapses into a single ready key.

use std::collections::HashMap;
use std::hash::Hash;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Debounces events by key (workspace root by default).
#[derive(Debug)]
pub struct Debouncer<K = PathBuf> {
    /// Pending keys and the time of their latest event.
    pending: HashMap<K, Instant>,
    /// Quiet period required before a key is ready.
    window: Duration,
}

impl<K: Eq + Hash + Clone> Debouncer<K> {
    pub fn new(window: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            window,
        }
    }

    /// Create a debouncer with the window given in milliseconds.
    pub fn from_millis(window_ms: u64) -> Self {
        Self::new(Duration::from_millis(window_ms))
    }

    /// Record an event, restarting the quiet period for `key`.
    pub fn record(&mut self, key: K) {
        self.pending.insert(key, Instant::now());
    }

    /// Take every key whose quiet period has elapsed.
    pub fn take_ready(&mut self) -> Vec<K> {
        let now = Instant::now();
        let mut ready = Vec::new();

        self.pending.retain(|key, last_event| {
            if now.duration_since(*last_event) >= self.window {
                ready.push(key.clone());
                false
            } else {
                true
            }
        });

        ready
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
