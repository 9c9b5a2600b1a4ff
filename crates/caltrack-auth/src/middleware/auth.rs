//! Credential authentication middleware.
//!
//! Clients send their credentials as the `auth-email` and `auth-token` query
//! parameters. [`user_auth`] authenticates them, binds the principal under a
//! fresh [`BindingKey`] for the duration of the downstream call, and removes
//! the binding when the request finishes, however it finishes.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware, routing::get};
//! use caltrack_auth::middleware::{AuthState, CurrentUser, request_id, user_auth};
//!
//! async fn me(CurrentUser(user): CurrentUser) -> String {
//!     user.email.clone()
//! }
//!
//! let app = Router::new()
//!     .route("/users/me", get(me))
//!     .route_layer(middleware::from_fn_with_state(auth_state.clone(), user_auth))
//!     .layer(middleware::from_fn(request_id))
//!     .with_state(auth_state);
//! ```

use axum::{
    body::Body,
    extract::State,
    http::{Request, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use uuid::Uuid;

use crate::error::AuthError;
use crate::session::{Authenticator, RequestBindings};

use super::request_id::RequestId;

/// Query parameter carrying the user's email.
pub const EMAIL_PARAM: &str = "auth-email";

/// Query parameter carrying the `value:id` token.
pub const TOKEN_PARAM: &str = "auth-token";

/// Message returned when either credential is missing.
pub const INCOMPLETE_DETAILS: &str = "Incomplete details for request";

// =============================================================================
// Auth State
// =============================================================================

/// State required by [`user_auth`] and the [`CurrentUser`] extractor.
///
/// Make it available to the extractor via `FromRef`.
///
/// [`CurrentUser`]: super::CurrentUser
#[derive(Clone)]
pub struct AuthState {
    pub authenticator: Authenticator,
    pub bindings: RequestBindings,
}

impl AuthState {
    pub fn new(authenticator: Authenticator, bindings: RequestBindings) -> Self {
        Self {
            authenticator,
            bindings,
        }
    }
}

/// Credentials the current request authenticated with.
///
/// Inserted into the request extensions by [`user_auth`].
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub token: String,
}

impl Credentials {
    /// Reads `auth-email` and `auth-token` from the query string.
    ///
    /// Empty values count as missing.
    pub fn from_query(query: Option<&str>) -> Option<Self> {
        let mut email = None;
        let mut token = None;

        for (key, value) in url::form_urlencoded::parse(query?.as_bytes()) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                EMAIL_PARAM => email = Some(value.to_string()),
                TOKEN_PARAM => token = Some(value.to_string()),
                _ => {}
            }
        }

        Some(Self {
            email: email?,
            token: token?,
        })
    }
}

impl<S> axum::extract::FromRequestParts<S> for Credentials
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Credentials>()
            .cloned()
            .ok_or_else(|| AuthError::unauthorized(INCOMPLETE_DETAILS))
    }
}

/// Key the current request's principal is bound under.
///
/// Generated by [`user_auth`] for every authenticated request. Clients pick
/// their own `X-Request-Id`, so that ID is never used as a binding key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingKey(String);

impl BindingKey {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BindingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Middleware
// =============================================================================

/// Authenticates the request and binds the principal to its request ID.
///
/// Responds 401 without calling the handler if a credential is missing or
/// authentication fails.
pub async fn user_auth(
    State(state): State<AuthState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(credentials) = Credentials::from_query(req.uri().query()) else {
        tracing::debug!(path = %req.uri().path(), "Request without credentials");
        return AuthError::unauthorized(INCOMPLETE_DETAILS).into_response();
    };

    let principal = match state
        .authenticator
        .authenticate(&credentials.email, &credentials.token)
        .await
    {
        Ok(principal) => principal,
        Err(e) => return e.into_response(),
    };

    let binding_key = BindingKey::generate();
    if let Some(request_id) = req.extensions().get::<RequestId>() {
        tracing::trace!(request_id = %request_id, binding = %binding_key, "Binding principal");
    }

    req.extensions_mut().insert(binding_key.clone());
    req.extensions_mut().insert(credentials);

    // Held across the handler; dropping it unbinds on every exit path.
    let _binding = state.bindings.bind_scoped(binding_key.0, principal);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_from_query() {
        let creds =
            Credentials::from_query(Some("auth-email=a%40example.com&auth-token=abc%3A1&x=y"))
                .unwrap();
        assert_eq!(creds.email, "a@example.com");
        assert_eq!(creds.token, "abc:1");
    }

    #[test]
    fn test_credentials_missing_or_empty() {
        assert!(Credentials::from_query(None).is_none());
        assert!(Credentials::from_query(Some("auth-email=a@example.com")).is_none());
        assert!(Credentials::from_query(Some("auth-token=abc:1")).is_none());
        assert!(Credentials::from_query(Some("auth-email=&auth-token=abc:1")).is_none());
    }
}
