//! Namespaced key-value cache with lazy time-to-live expiry.
//!
//! Entries are addressed by a [`CacheKey`] made of a namespace and a local
//! key. Expiry is checked only when an entry is read: a `get` that finds an
//! expired entry removes it and reports a miss. Nothing is reclaimed in the
//! background unless [`ExpiringCache::cleanup_expired`] is called, which the
//! reaper task in [`super::reaper`] does periodically.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use caltrack_auth::cache::ExpiringCache;
//!
//! let cache: ExpiringCache<u32> = ExpiringCache::new();
//! cache.set("namespace", "key", 1, Duration::ZERO);
//! assert_eq!(cache.get("namespace", "key").as_deref(), Some(&1));
//!
//! cache.delete("namespace", "key");
//! assert!(cache.get("namespace", "key").is_none());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

// =============================================================================
// Cache Key
// =============================================================================

/// Composite address of a cache entry.
///
/// The two components are stored separately, so no choice of namespace or
/// key can collide with another pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Caller-chosen namespace (an email, a reserved binding namespace, ...).
    pub namespace: String,
    /// Key inside the namespace.
    pub key: String,
}

impl CacheKey {
    /// Creates a key from its namespace and local key.
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
        }
    }

    /// Returns `true` if the key lives in the given namespace.
    #[must_use]
    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.namespace == namespace
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.key)
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

/// A stored value with its insertion time and time-to-live.
pub struct CacheEntry<V> {
    /// Shared payload. Clones of the entry share the same value.
    pub value: Arc<V>,
    /// When the entry was inserted.
    pub inserted_at: Instant,
    /// Lifetime of the entry. `Duration::ZERO` means it never expires by time.
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn new(value: Arc<V>, ttl: Duration) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    /// Returns `true` if the entry is expired at `now`.
    ///
    /// An entry is expired only once `now` is strictly past
    /// `inserted_at + ttl`.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        if self.ttl.is_zero() {
            return false;
        }
        match self.inserted_at.checked_add(self.ttl) {
            Some(deadline) => now > deadline,
            None => false,
        }
    }

    /// Returns `true` if the entry is expired now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}

impl<V> Clone for CacheEntry<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            inserted_at: self.inserted_at,
            ttl: self.ttl,
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for CacheEntry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("value", &self.value)
            .field("inserted_at", &self.inserted_at)
            .field("ttl", &self.ttl)
            .finish()
    }
}

// =============================================================================
// Cache Statistics
// =============================================================================

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of entries currently in the cache, expired or not.
    pub size: usize,
    /// Number of reads that returned a value.
    pub hits: u64,
    /// Number of reads that returned nothing.
    pub misses: u64,
    /// Number of entries removed because their TTL elapsed.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

// =============================================================================
// Expiring Cache
// =============================================================================

/// Thread-safe namespaced cache with per-entry TTL.
///
/// All writes take the exclusive side of a single `RwLock`, reads take the
/// shared side. The lock only ever covers map operations; no caller code
/// runs while it is held.
pub struct ExpiringCache<V> {
    entries: RwLock<HashMap<CacheKey, CacheEntry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V> ExpiringCache<V> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Inserts or overwrites the entry for `(namespace, key)`.
    ///
    /// The entry is timestamped at insertion. A zero `ttl` keeps it until
    /// it is deleted explicitly.
    pub fn set(&self, namespace: &str, key: &str, value: V, ttl: Duration) -> Arc<V> {
        self.set_shared(namespace, key, Arc::new(value), ttl)
    }

    /// Same as [`set`](Self::set) for a value that is already shared.
    pub fn set_shared(&self, namespace: &str, key: &str, value: Arc<V>, ttl: Duration) -> Arc<V> {
        let entry = CacheEntry::new(Arc::clone(&value), ttl);
        self.entries
            .write()
            .insert(CacheKey::new(namespace, key), entry);
        value
    }

    /// Returns the value for `(namespace, key)` if present and not expired.
    ///
    /// An expired entry is removed by this call before `None` is returned.
    pub fn get(&self, namespace: &str, key: &str) -> Option<Arc<V>> {
        self.get_by_key(&CacheKey::new(namespace, key))
    }

    /// Same as [`get`](Self::get) on a precomputed key.
    pub fn get_by_key(&self, cache_key: &CacheKey) -> Option<Arc<V>> {
        let now = Instant::now();

        {
            let entries = self.entries.read();
            match entries.get(cache_key) {
                Some(entry) if !entry.is_expired_at(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(Arc::clone(&entry.value));
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        // Expired. Re-check under the write lock: a `set` may have replaced
        // the entry between the two lock acquisitions.
        let mut entries = self.entries.write();
        if entries
            .get(cache_key)
            .is_some_and(|entry| entry.is_expired_at(now))
        {
            entries.remove(cache_key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key = %cache_key, "Expired cache entry evicted on read");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Removes the entry for `(namespace, key)`. Absent keys are ignored.
    pub fn delete(&self, namespace: &str, key: &str) {
        self.delete_by_key(&CacheKey::new(namespace, key));
    }

    /// Removes the entry for a precomputed key. Absent keys are ignored.
    pub fn delete_by_key(&self, cache_key: &CacheKey) {
        self.entries.write().remove(cache_key);
    }

    /// Removes the entry for `cache_key` only if it still holds `value`.
    ///
    /// Identity is pointer equality of the shared value. Returns `true` if
    /// the entry was removed.
    pub fn delete_if_same(&self, cache_key: &CacheKey, value: &Arc<V>) -> bool {
        let mut entries = self.entries.write();
        if entries
            .get(cache_key)
            .is_some_and(|entry| Arc::ptr_eq(&entry.value, value))
        {
            entries.remove(cache_key);
            true
        } else {
            false
        }
    }

    /// Removes every entry in `namespace` and returns how many were removed.
    pub fn delete_namespace(&self, namespace: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.in_namespace(namespace));
        before - entries.len()
    }

    /// Swaps the value of a live entry, keeping its insertion time and TTL.
    ///
    /// Returns `false` if the entry is absent or already expired; nothing is
    /// inserted in that case.
    pub fn replace_value(&self, cache_key: &CacheKey, value: Arc<V>) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.write();
        match entries.get_mut(cache_key) {
            Some(entry) if !entry.is_expired_at(now) => {
                entry.value = value;
                true
            }
            _ => false,
        }
    }

    /// Returns a snapshot of every entry, expired ones included.
    ///
    /// The snapshot is taken under the read lock and returned detached, so
    /// callers may iterate it while other tasks keep writing. Writes made
    /// after the snapshot are not reflected in it.
    pub fn list_all(&self) -> Vec<(CacheKey, CacheEntry<V>)> {
        self.entries
            .read()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - entries.len();
        drop(entries);

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// Number of entries currently stored, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Get cache statistics for monitoring.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl<V> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for ExpiringCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("stats", &self.stats())
            .finish()
    }
}
