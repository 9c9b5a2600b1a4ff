//! In-memory expiring cache.
//!
//! ## Architecture
//!
//! - **[`ExpiringCache`]**: namespaced map guarded by one `RwLock`, lazy TTL
//!   expiry on read
//! - **[`spawn_reaper`]**: optional periodic sweep of expired entries
//!
//! One instance is created by the application's composition root and shared
//! through `Arc` with every component that needs it. It is process-local:
//! nothing is replicated or persisted.

pub mod expiring;
pub mod reaper;

pub use expiring::{CacheEntry, CacheKey, CacheStats, ExpiringCache};
pub use reaper::spawn_reaper;
