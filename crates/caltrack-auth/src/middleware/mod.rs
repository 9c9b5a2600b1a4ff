//! HTTP middleware for authentication.
//!
//! This module provides Axum middleware for:
//!
//! - Request ID assignment ([`request_id`])
//! - Credential authentication and request binding ([`user_auth`])
//! - Access to the bound principal ([`CurrentUser`])
//! - JSON error responses for [`AuthError`](crate::AuthError)
//!
//! Install `request_id` outside `user_auth` so authentication logs carry the
//! request ID.

pub mod auth;
pub mod error;
pub mod extract;
pub mod request_id;

pub use auth::{AuthState, BindingKey, Credentials, INCOMPLETE_DETAILS, user_auth};
pub use error::status_code;
pub use extract::CurrentUser;
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id};
