//! # caltrack-auth
//!
//! Session core of the caltrack backend.
//!
//! This crate provides:
//! - A namespaced in-memory cache with lazy TTL expiry
//! - Request-scoped user binding with guaranteed unbind
//! - Token authentication backed by a principal cache
//! - Credential mutations that invalidate cached sessions
//! - Axum middleware and extractors for the above
//!
//! ## Modules
//!
//! - [`cache`] - Expiring key-value cache and its background reaper
//! - [`session`] - Request bindings, principal cache, authentication
//! - [`account`] - Login, sign-out, password reset, group change, profile update
//! - [`credentials`] - Argon2 password hashing
//! - [`storage`] - Account storage traits and the in-memory store
//! - [`middleware`] - HTTP middleware, extractors and error responses
//! - [`types`] - Users, groups, permissions, access tokens
//! - [`config`] - Session lifetimes

pub mod account;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod middleware;
pub mod session;
pub mod storage;
pub mod types;

pub use account::{AccountService, CreatedAccount, ProfileUpdate};
pub use cache::{CacheEntry, CacheKey, CacheStats, ExpiringCache, spawn_reaper};
pub use config::{ConfigError, SessionConfig};
pub use error::{AuthError, ErrorCategory, INVALID_CREDENTIALS};
pub use middleware::{AuthState, BindingKey, CurrentUser, RequestId, request_id, user_auth};
pub use session::{
    Authenticator, BindingGuard, PrincipalCache, RequestBindings, SessionCache, SessionManager,
};
pub use storage::{AccountStorage, AccountTransaction, InMemoryAccountStorage};
pub use types::{AccessToken, Group, IssuedToken, Permission, User};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use caltrack_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::account::{AccountService, ProfileUpdate};
    pub use crate::config::SessionConfig;
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::middleware::{AuthState, Credentials, CurrentUser, RequestId};
    pub use crate::session::{Authenticator, RequestBindings, SessionCache, SessionManager};
    pub use crate::storage::{AccountStorage, InMemoryAccountStorage};
    pub use crate::types::{Group, Permission, User};
}
