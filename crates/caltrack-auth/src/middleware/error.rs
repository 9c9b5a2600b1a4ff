//! Error response handling for authentication middleware.
//!
//! `AuthError` renders as a JSON body `{ "error": code, "message": text }`.
//! Unauthorized responses also carry a `WWW-Authenticate` challenge.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

/// Realm advertised in `WWW-Authenticate` challenges.
pub const AUTH_REALM: &str = "caltrack";

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_code(&self);
        let code = self.error_code();
        let message = public_message(&self);

        if status.is_server_error() {
            tracing::error!(error = %self, category = %self.category(), "Request failed");
        }

        let mut headers = HeaderMap::new();
        if status == StatusCode::UNAUTHORIZED {
            let challenge = build_www_authenticate_header(code, &message);
            if let Ok(value) = HeaderValue::from_str(&challenge) {
                headers.insert(header::WWW_AUTHENTICATE, value);
            }
        }

        let body = json!({
            "error": code,
            "message": message,
        });

        (status, headers, Json(body)).into_response()
    }
}

/// Maps an error to its HTTP status.
#[must_use]
pub fn status_code(error: &AuthError) -> StatusCode {
    match error {
        AuthError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        AuthError::Forbidden { .. } => StatusCode::FORBIDDEN,
        AuthError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
        AuthError::NotFound { .. } => StatusCode::NOT_FOUND,
        AuthError::Storage { .. } | AuthError::Configuration { .. } | AuthError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Message sent to the client. Server-side details stay in the logs.
fn public_message(error: &AuthError) -> String {
    match error {
        AuthError::Unauthorized { message }
        | AuthError::Forbidden { message }
        | AuthError::InvalidRequest { message }
        | AuthError::NotFound { message } => message.clone(),
        AuthError::Storage { .. } | AuthError::Configuration { .. } | AuthError::Internal { .. } => {
            "Internal server error".to_string()
        }
    }
}

/// Builds the WWW-Authenticate header value for 401 responses.
///
/// Format: `Token realm="caltrack", error="unauthorized", error_description="..."`
fn build_www_authenticate_header(error: &str, description: &str) -> String {
    let escaped_desc = description.replace('"', "\\\"");
    format!("Token realm=\"{AUTH_REALM}\", error=\"{error}\", error_description=\"{escaped_desc}\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_unauthorized_response() {
        let response = AuthError::invalid_credentials().into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let www_auth = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(www_auth.starts_with("Token realm=\"caltrack\""));
        assert!(www_auth.contains("error=\"unauthorized\""));

        let json = body_json(response).await;
        assert_eq!(json["error"], "unauthorized");
        assert_eq!(json["message"], "Invalid Authentication Credentials");
    }

    #[tokio::test]
    async fn test_forbidden_response() {
        let response = AuthError::forbidden("Insufficient permissions").into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(!response.headers().contains_key(header::WWW_AUTHENTICATE));
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_client_error_statuses() {
        assert_eq!(
            AuthError::invalid_request("bad").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::not_found("User 9 not found").into_response().status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_server_error_hides_details() {
        let response = AuthError::storage("connection to 10.0.0.5 refused").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "server_error");
        assert_eq!(json["message"], "Internal server error");
    }

    #[test]
    fn test_www_authenticate_header_escaping() {
        let header = build_www_authenticate_header("unauthorized", "Token contains \"quotes\"");
        assert!(header.contains("\\\"quotes\\\""));
    }
}
