//! Authenticated-user cache.
//!
//! Successful authentications are cached under `(email, token)` for the
//! configured TTL so repeated requests with the same credentials skip the
//! account store. All tokens of one principal share the email namespace,
//! which is what invalidation and refresh operate on.
//!
//! Invalidation walks a snapshot of the whole cache. A `set` that races with
//! the scan may survive it; callers invalidate after their transaction has
//! committed, so a racing authentication already sees the new state.

use std::sync::Arc;
use std::time::Duration;

use crate::session::SessionCache;
use crate::types::User;

/// Cache of authenticated principals keyed by `(email, token)`.
#[derive(Debug, Clone)]
pub struct PrincipalCache {
    cache: Arc<SessionCache>,
    ttl: Duration,
}

impl PrincipalCache {
    /// Creates a principal cache over the shared session cache.
    pub fn new(cache: Arc<SessionCache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// TTL applied to new entries.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached principal for these credentials.
    ///
    /// Namespaces that are not email addresses, such as the request binding
    /// namespace, are never read.
    pub fn get(&self, email: &str, token: &str) -> Option<Arc<User>> {
        if !User::is_valid_email(email) {
            return None;
        }
        self.cache.get(email, token)
    }

    /// Caches `principal` for these credentials.
    ///
    /// Nothing is stored unless `email` is an email address.
    pub fn put(&self, email: &str, token: &str, principal: Arc<User>) -> Arc<User> {
        if !User::is_valid_email(email) {
            tracing::warn!(email = %email, "Refusing to cache principal under a non-email namespace");
            return principal;
        }
        self.cache.set_shared(email, token, principal, self.ttl)
    }

    /// Forgets one `(email, token)` pair.
    pub fn evict(&self, email: &str, token: &str) {
        if User::is_valid_email(email) {
            self.cache.delete(email, token);
        }
    }

    /// Removes every cached session of `principal` and returns how many were
    /// removed.
    pub fn invalidate_principal_sessions(&self, principal: &User) -> usize {
        let mut removed = 0;
        for (key, _) in self.cache.list_all() {
            if key.in_namespace(&principal.email) {
                self.cache.delete_by_key(&key);
                removed += 1;
            }
        }

        tracing::debug!(
            user_id = principal.id,
            email = %principal.email,
            removed,
            "Invalidated cached sessions"
        );
        removed
    }

    /// Replaces the principal in every cached session of `principal.email`
    /// and returns how many were updated.
    ///
    /// Entries keep their remaining lifetime.
    pub fn refresh_principal_sessions(&self, principal: &User) -> usize {
        let shared = Arc::new(principal.clone());
        let mut refreshed = 0;
        for (key, _) in self.cache.list_all() {
            if key.in_namespace(&principal.email)
                && self.cache.replace_value(&key, Arc::clone(&shared))
            {
                refreshed += 1;
            }
        }

        tracing::debug!(
            user_id = principal.id,
            email = %principal.email,
            refreshed,
            "Refreshed cached sessions"
        );
        refreshed
    }
}
