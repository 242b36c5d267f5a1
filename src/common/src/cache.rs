//! In-memory response cache with per-entry time-to-live.
//!
//! There is no eviction policy beyond expiry: expired entries are dropped
//! lazily on lookup, or all at once by [`TtlCache::clear`] (called from the
//! logout path) and [`TtlCache::purge_expired`].

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Entry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

struct Entries<K, V> {
    map: HashMap<K, Entry<V>>,
    /// Bumped by every `clear`.
    epoch: u64,
}

/// Shared TTL cache. Cloning yields a handle to the same entries.
pub struct TtlCache<K, V> {
    entries: Arc<Mutex<Entries<K, V>>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            clock: self.clock.clone(),
            default_ttl: self.default_ttl,
        }
    }
}

impl<K, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Entries {
                map: HashMap::new(),
                epoch: 0,
            })),
            clock,
            default_ttl,
        }
    }

    /// Returns a clone of the cached value if present and not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.lock();

        match entries.map.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                entries.map.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let expires_at = self.expiry(ttl);
        self.lock().map.insert(key, Entry { value, expires_at });
    }

    /// Current invalidation epoch. Read it before computing a value and pass
    /// it to [`TtlCache::set_if_epoch`].
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Store `value` only if no `clear` happened since `epoch` was read.
    /// Returns whether the value was stored.
    pub fn set_if_epoch(&self, key: K, value: V, epoch: u64) -> bool {
        let expires_at = self.expiry(self.default_ttl);
        let mut entries = self.lock();
        if entries.epoch != epoch {
            return false;
        }
        entries.map.insert(key, Entry { value, expires_at });
        true
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.lock().map.remove(key).map(|entry| entry.value)
    }

    /// Drop every entry and invalidate values computed before this call.
    pub fn clear(&self) {
        let mut entries = self.lock();
        let count = entries.map.len();
        entries.map.clear();
        entries.epoch += 1;
        log::debug!("Cleared {count} cache entries");
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let before = entries.map.len();
        entries.map.retain(|_, entry| entry.expires_at > now);
        before - entries.map.len()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        // Out-of-range TTLs saturate to "never expires in practice".
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        self.clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries<K, V>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
