//! Access token domain type.
//!
//! Clients authenticate every request with an email and a token of the form
//! `value:id`, where `id` is the storage identifier of the token record and
//! `value` is a random secret. Only the SHA-256 hash of `value` is stored.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::AuthError;
use crate::types::User;
use crate::AuthResult;

/// Separator between the secret value and the record id of a token.
pub const TOKEN_SEPARATOR: char = ':';

/// Access token stored for a user.
///
/// # Storage Security
///
/// The token value is never stored. When validating a presented token:
///
/// 1. Split it into value and id
/// 2. Look the record up by id
/// 3. Validate expiration and deletion
/// 4. Compare the hash of the value with the stored hash
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    /// Identifier assigned by storage.
    pub id: i64,

    /// Owner of the token.
    pub user_id: i64,

    /// SHA-256 hash of the token value.
    pub token_hash: String,

    /// When this token was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When this token stops being accepted.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Set on sign-out. Deleted tokens are never accepted.
    #[serde(default)]
    pub deleted: bool,
}

impl AccessToken {
    /// Returns `true` if this token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }

    /// Returns `true` if this token is neither expired nor deleted.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.deleted && !self.is_expired()
    }

    /// Returns `true` if `value` hashes to the stored hash.
    #[must_use]
    pub fn has_value(&self, value: &str) -> bool {
        Self::hash_token(value) == self.token_hash
    }

    /// Hash a token value using SHA-256.
    #[must_use]
    pub fn hash_token(value: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Generate a cryptographically secure random token value.
    ///
    /// Returns a 256-bit random value encoded as base64url (43 characters).
    #[must_use]
    pub fn generate_value() -> String {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Builds the client-facing token string for this record.
    #[must_use]
    pub fn encode(&self, value: &str) -> String {
        format!("{value}{TOKEN_SEPARATOR}{}", self.id)
    }
}

/// A client token split into its secret value and record id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenParts {
    pub value: String,
    pub id: i64,
}

/// Splits a client token of the form `value:id`.
///
/// # Errors
///
/// Returns the opaque invalid-credentials error unless the token has exactly
/// two non-empty parts and the second one is an integer.
pub fn split_token(token: &str) -> AuthResult<TokenParts> {
    let mut parts = token.split(TOKEN_SEPARATOR);
    let (Some(value), Some(id), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AuthError::invalid_credentials());
    };

    if value.is_empty() {
        return Err(AuthError::invalid_credentials());
    }

    let id = id
        .parse::<i64>()
        .map_err(|_| AuthError::invalid_credentials())?;

    Ok(TokenParts {
        value: value.to_string(),
        id,
    })
}

/// Response body of a successful login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    #[serde(flatten)]
    pub user: User,

    /// Token to present as `auth-token` on subsequent requests.
    pub token: String,

    #[serde(with = "time::serde::rfc3339")]
    pub token_expiration: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn token(expires_in: Duration, deleted: bool) -> AccessToken {
        let now = OffsetDateTime::now_utc();
        AccessToken {
            id: 42,
            user_id: 1,
            token_hash: AccessToken::hash_token("secret"),
            created_at: now,
            expires_at: now + expires_in,
            deleted,
        }
    }

    #[test]
    fn test_hash_token() {
        let hash = AccessToken::hash_token("test-token-value");

        // SHA-256 produces 64 hex characters
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, AccessToken::hash_token("test-token-value"));
        assert_ne!(hash, AccessToken::hash_token("different-token"));
    }

    #[test]
    fn test_generate_value() {
        let value = AccessToken::generate_value();
        assert_eq!(value.len(), 43);
        assert!(!value.contains(TOKEN_SEPARATOR));
        assert_ne!(value, AccessToken::generate_value());
    }

    #[test]
    fn test_token_validity() {
        assert!(token(Duration::hours(1), false).is_valid());
        assert!(!token(Duration::hours(1), true).is_valid());

        let expired = token(Duration::hours(-1), false);
        assert!(expired.is_expired());
        assert!(!expired.is_valid());
    }

    #[test]
    fn test_has_value() {
        let record = token(Duration::hours(1), false);
        assert!(record.has_value("secret"));
        assert!(!record.has_value("Secret"));
    }

    #[test]
    fn test_encode_then_split() {
        let record = token(Duration::hours(1), false);
        let encoded = record.encode("abc");
        assert_eq!(encoded, "abc:42");

        let parts = split_token(&encoded).unwrap();
        assert_eq!(parts.value, "abc");
        assert_eq!(parts.id, 42);
    }

    #[test]
    fn test_split_token_rejects_malformed() {
        for bad in ["", "abc", "abc:", ":42", "abc:42:1", "abc:x", "abc:4.2"] {
            let err = split_token(bad).unwrap_err();
            assert!(err.is_authentication_error(), "{bad:?} should be rejected");
            assert_eq!(
                err.to_string(),
                "Unauthorized: Invalid Authentication Credentials"
            );
        }
    }
}
