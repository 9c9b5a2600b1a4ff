//! Background sweep for entries that are never read again.
//!
//! Lazy expiry only reclaims an entry when somebody reads it. Keys that are
//! written once and never queried (a token used for a single request, for
//! example) would otherwise stay in memory forever. The reaper bounds that
//! growth by calling [`ExpiringCache::cleanup_expired`] on an interval.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::ExpiringCache;

/// Spawns a task that sweeps expired entries every `interval`.
///
/// The task holds only a weak reference to the cache and exits on its own
/// once the cache has been dropped. Abort the returned handle to stop it
/// earlier.
///
/// # Panics
///
/// Panics if `interval` is zero (as `tokio::time::interval` does).
pub fn spawn_reaper<V>(cache: &Arc<ExpiringCache<V>>, interval: Duration) -> JoinHandle<()>
where
    V: Send + Sync + 'static,
{
    let cache: Weak<ExpiringCache<V>> = Arc::downgrade(cache);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(cache) = cache.upgrade() else {
                tracing::debug!("Cache dropped, stopping reaper");
                break;
            };

            let removed = cache.cleanup_expired();
            if removed > 0 {
                tracing::debug!(removed, remaining = cache.len(), "Reaped expired cache entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reaper_removes_unread_entries() {
        let cache = Arc::new(ExpiringCache::new());
        cache.set("ns", "short", 1, Duration::from_millis(1));
        cache.set("ns", "forever", 2, Duration::ZERO);

        let handle = spawn_reaper(&cache, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(cache.len(), 1);
        assert!(cache.get("ns", "forever").is_some());
        handle.abort();
    }

    #[tokio::test]
    async fn test_reaper_stops_when_cache_dropped() {
        let cache: Arc<ExpiringCache<u8>> = Arc::new(ExpiringCache::new());
        let handle = spawn_reaper(&cache, Duration::from_millis(5));

        drop(cache);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reaper should exit after the cache is dropped")
            .unwrap();
    }
}
