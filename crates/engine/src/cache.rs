//! Short-lived read caches scoped per user.
//!
//! Entries expire after a fixed time-to-live, but correctness never depends on
//! expiry: every mutation invalidates the keys it can affect before returning.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub(crate) struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> TtlCache<V> {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (Instant, V)>> {
        // Entries are replaced whole, so a poisoned map is still consistent.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub(crate) fn set(&self, key: String, value: V) {
        if self.ttl.is_zero() {
            return;
        }
        self.lock().insert(key, (Instant::now(), value));
    }

    pub(crate) fn invalidate(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Drops every key of `scope` (keys are `"{scope}"` or `"{scope}:…"`).
    pub(crate) fn invalidate_scope(&self, scope: &str) {
        let prefix = format!("{scope}:");
        self.lock()
            .retain(|key, _| key != scope && !key.starts_with(&prefix));
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }
}

pub(crate) fn scoped_key(scope: &str, suffix: impl std::fmt::Display) -> String {
    format!("{scope}:{suffix}")
}
