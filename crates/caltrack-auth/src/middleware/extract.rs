//! Extractor for the principal bound to the current request.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::error::AuthError;
use crate::types::User;

use super::auth::{AuthState, BindingKey};

/// The authenticated user of the current request.
///
/// Reads the request binding created by [`user_auth`]. A request that was
/// never bound is rejected with 401.
///
/// # Example
///
/// ```ignore
/// async fn handler(CurrentUser(user): CurrentUser) -> String {
///     format!("Hello, {}!", user.name)
/// }
/// ```
///
/// [`user_auth`]: super::user_auth
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Arc<User>);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AuthState::from_ref(state);

        let Some(key) = parts.extensions.get::<BindingKey>() else {
            return Err(AuthError::unauthorized("Request is not authenticated"));
        };

        state
            .bindings
            .current_user(key.as_str())
            .map(CurrentUser)
            .ok_or_else(|| {
                tracing::debug!(binding = %key, "No user bound to request");
                AuthError::unauthorized("Request is not authenticated")
            })
    }
}
