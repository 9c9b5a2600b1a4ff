//! Session binding protocol.
//!
//! One [`SessionCache`] instance backs two uses:
//!
//! - **Authenticated-user cache** ([`PrincipalCache`]): namespace = email,
//!   key = client token, TTL = `session.principal_ttl`
//! - **Request bindings** ([`RequestBindings`]): namespace =
//!   [`REQUEST_BINDING_NAMESPACE`], key = server-generated binding key,
//!   no TTL
//!
//! [`Authenticator`] rejects, and [`PrincipalCache`] never reads or writes,
//! a namespace that is not an email address (see [`User::is_valid_email`]),
//! so credentials can never address a request binding.
//!
//! # Flow
//!
//! ```text
//! request ──► Authenticator::authenticate(email, token)
//!               ├─ PrincipalCache hit ──────────────► principal
//!               └─ miss ─► AccountStorage ─► verify ─► cache ─► principal
//!         ──► RequestBindings::bind_scoped(binding_key) ─► BindingGuard
//!         ──► handler reads RequestBindings::current_user(binding_key)
//!         ──► guard dropped ─► binding removed
//! ```

pub mod authenticate;
pub mod binding;
pub mod principal;

pub use authenticate::Authenticator;
pub use binding::{BindingGuard, RequestBindings};
pub use principal::PrincipalCache;

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::cache::{ExpiringCache, spawn_reaper};
use crate::config::SessionConfig;
use crate::types::User;

/// Namespace holding request bindings.
pub const REQUEST_BINDING_NAMESPACE: &str = "req-user";

/// Cache shared by principal entries and request bindings.
pub type SessionCache = ExpiringCache<User>;

/// Handle on the shared session cache and its two views.
///
/// Cheap to clone; all clones share the same cache.
#[derive(Debug, Clone)]
pub struct SessionManager {
    cache: Arc<SessionCache>,
    bindings: RequestBindings,
    principals: PrincipalCache,
    config: SessionConfig,
}

impl SessionManager {
    /// Creates the session views over `cache`.
    pub fn new(cache: Arc<SessionCache>, config: SessionConfig) -> Self {
        Self {
            bindings: RequestBindings::new(Arc::clone(&cache)),
            principals: PrincipalCache::new(Arc::clone(&cache), config.principal_ttl),
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    pub fn bindings(&self) -> &RequestBindings {
        &self.bindings
    }

    pub fn principals(&self) -> &PrincipalCache {
        &self.principals
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// See [`PrincipalCache::invalidate_principal_sessions`].
    pub fn invalidate_principal_sessions(&self, principal: &User) -> usize {
        self.principals.invalidate_principal_sessions(principal)
    }

    /// See [`PrincipalCache::refresh_principal_sessions`].
    pub fn refresh_principal_sessions(&self, principal: &User) -> usize {
        self.principals.refresh_principal_sessions(principal)
    }

    /// Starts the background sweep if `session.reaper_interval` is non-zero.
    pub fn spawn_reaper(&self) -> Option<JoinHandle<()>> {
        let interval = self.config.reaper()?;
        tracing::info!(interval = ?interval, "Starting session cache reaper");
        Some(spawn_reaper(&self.cache, interval))
    }
}
