//! Credential verification with the authenticated-user cache in front.

use std::sync::Arc;

use crate::AuthResult;
use crate::error::AuthError;
use crate::session::PrincipalCache;
use crate::storage::AccountStorage;
use crate::types::{User, split_token};

/// Verifies `(email, token)` pairs against the account store.
///
/// Every rejection is the same opaque `Unauthorized` error. The specific
/// reason is logged at debug level, storage failures at warn level.
#[derive(Clone)]
pub struct Authenticator {
    storage: Arc<dyn AccountStorage>,
    principals: PrincipalCache,
}

impl Authenticator {
    pub fn new(storage: Arc<dyn AccountStorage>, principals: PrincipalCache) -> Self {
        Self {
            storage,
            principals,
        }
    }

    /// Authenticates a request's credentials.
    ///
    /// A cached principal is returned without touching the store. Otherwise
    /// the user and token record are loaded and checked, and the principal
    /// is cached for the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthorized` with the invalid-credentials
    /// message for any failure, storage failures included.
    pub async fn authenticate(&self, email: &str, token: &str) -> AuthResult<Arc<User>> {
        let email = User::normalize_email(email);
        if !User::is_valid_email(&email) {
            return Err(reject(&email, "not an email address"));
        }

        if let Some(principal) = self.principals.get(&email, token) {
            tracing::trace!(email = %email, "Authenticated from cache");
            return Ok(principal);
        }

        let user = self.verify(&email, token).await?;
        tracing::debug!(user_id = user.id, email = %email, "Authenticated from store");
        Ok(self.principals.put(&email, token, Arc::new(user)))
    }

    async fn verify(&self, email: &str, token: &str) -> AuthResult<User> {
        let user = match self.storage.find_user_by_email(email).await {
            Ok(Some(user)) if !user.deleted => user,
            Ok(Some(_)) => return Err(reject(email, "user is deleted")),
            Ok(None) => return Err(reject(email, "unknown email")),
            Err(e) => return Err(storage_failure(email, &e)),
        };

        let parts = split_token(token).map_err(|_| reject(email, "malformed token"))?;

        let record = match self.storage.find_token(parts.id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(reject(email, "unknown token id")),
            Err(e) => return Err(storage_failure(email, &e)),
        };

        if record.user_id != user.id {
            return Err(reject(email, "token belongs to another user"));
        }
        if record.deleted {
            return Err(reject(email, "token is deleted"));
        }
        if record.is_expired() {
            return Err(reject(email, "token is expired"));
        }
        if !record.has_value(&parts.value) {
            return Err(reject(email, "token value mismatch"));
        }

        Ok(user)
    }
}

fn reject(email: &str, reason: &'static str) -> AuthError {
    tracing::debug!(email = %email, reason, "Authentication rejected");
    AuthError::invalid_credentials()
}

fn storage_failure(email: &str, error: &AuthError) -> AuthError {
    tracing::warn!(email = %email, error = %error, "Account storage failed during authentication");
    AuthError::invalid_credentials()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::error::INVALID_CREDENTIALS;
    use crate::session::SessionCache;
    use crate::session::tests::{CountingStorage, seed_account};
    use crate::types::Group;

    fn setup() -> (Arc<CountingStorage>, PrincipalCache, Authenticator) {
        let storage = Arc::new(CountingStorage::default());
        let principals =
            PrincipalCache::new(Arc::new(SessionCache::new()), Duration::from_secs(3600));
        let authenticator = Authenticator::new(storage.clone(), principals.clone());
        (storage, principals, authenticator)
    }

    fn assert_invalid_credentials(err: AuthError) {
        match err {
            AuthError::Unauthorized { message } => assert_eq!(message, INVALID_CREDENTIALS),
            other => panic!("expected Unauthorized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cache_hit_avoids_store() {
        let (storage, _, auth) = setup();
        let (user, token) =
            seed_account(storage.as_ref(), "a@example.com", Group::Regular, time::Duration::days(1)).await;

        let first = auth.authenticate("a@example.com", &token).await.unwrap();
        assert_eq!(first.id, user.id);
        assert_eq!(storage.lookups(), (1, 1));

        let second = auth.authenticate("a@example.com", &token).await.unwrap();
        assert_eq!(second.id, user.id);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(storage.lookups(), (1, 1));
    }

    #[tokio::test]
    async fn test_email_is_case_insensitive() {
        let (storage, principals, auth) = setup();
        let (_, token) =
            seed_account(storage.as_ref(), "a@example.com", Group::Regular, time::Duration::days(1)).await;

        auth.authenticate("A@Example.COM", &token).await.unwrap();
        assert!(principals.get("a@example.com", &token).is_some());

        auth.authenticate("a@example.com", &token).await.unwrap();
        assert_eq!(storage.lookups(), (1, 1));
    }

    #[tokio::test]
    async fn test_wrong_token_value_rejected() {
        let (storage, principals, auth) = setup();
        let (_, token) =
            seed_account(storage.as_ref(), "a@example.com", Group::Regular, time::Duration::days(1)).await;
        let id = token.rsplit(':').next().unwrap();

        let err = auth
            .authenticate("a@example.com", &format!("forged:{id}"))
            .await
            .unwrap_err();
        assert_invalid_credentials(err);
        assert!(principals.get("a@example.com", &format!("forged:{id}")).is_none());
    }

    #[tokio::test]
    async fn test_malformed_token_skips_token_lookup() {
        let (storage, _, auth) = setup();
        seed_account(storage.as_ref(), "a@example.com", Group::Regular, time::Duration::days(1)).await;

        for token in ["no-separator", "a:b:c", "value:not-a-number"] {
            let err = auth.authenticate("a@example.com", token).await.unwrap_err();
            assert_invalid_credentials(err);
        }
        assert_eq!(storage.token_lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_email_rejected() {
        let (storage, _, auth) = setup();
        let (_, token) =
            seed_account(storage.as_ref(), "a@example.com", Group::Regular, time::Duration::days(1)).await;

        let err = auth.authenticate("b@example.com", &token).await.unwrap_err();
        assert_invalid_credentials(err);
    }

    #[tokio::test]
    async fn test_request_binding_cannot_be_used_as_credentials() {
        let storage = Arc::new(CountingStorage::default());
        let cache = Arc::new(SessionCache::new());
        let principals = PrincipalCache::new(Arc::clone(&cache), Duration::from_secs(3600));
        let auth = Authenticator::new(storage.clone(), principals);
        let bindings = crate::session::RequestBindings::new(Arc::clone(&cache));
        let (admin, _) =
            seed_account(storage.as_ref(), "admin@example.com", Group::Admin, time::Duration::days(1)).await;

        let _guard = bindings.bind_scoped("in-flight-request", Arc::new(admin));

        let err = auth
            .authenticate(crate::session::REQUEST_BINDING_NAMESPACE, "in-flight-request")
            .await
            .unwrap_err();
        assert_invalid_credentials(err);
        assert_eq!(storage.lookups(), (0, 0));
    }

    #[tokio::test]
    async fn test_token_of_other_user_rejected() {
        let (storage, _, auth) = setup();
        seed_account(storage.as_ref(), "a@example.com", Group::Regular, time::Duration::days(1)).await;
        let (_, bob_token) =
            seed_account(storage.as_ref(), "b@example.com", Group::Regular, time::Duration::days(1)).await;

        let err = auth.authenticate("a@example.com", &bob_token).await.unwrap_err();
        assert_invalid_credentials(err);
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let (storage, _, auth) = setup();
        let (_, token) =
            seed_account(storage.as_ref(), "a@example.com", Group::Regular, time::Duration::hours(-1)).await;

        let err = auth.authenticate("a@example.com", &token).await.unwrap_err();
        assert_invalid_credentials(err);
    }

    #[tokio::test]
    async fn test_deleted_token_rejected() {
        let (storage, _, auth) = setup();
        let (_, token) =
            seed_account(storage.as_ref(), "a@example.com", Group::Regular, time::Duration::days(1)).await;
        let id: i64 = token.rsplit(':').next().unwrap().parse().unwrap();
        storage.revoke_token(id).await.unwrap();

        let err = auth.authenticate("a@example.com", &token).await.unwrap_err();
        assert_invalid_credentials(err);
    }

    #[tokio::test]
    async fn test_storage_failure_is_unauthorized() {
        let (storage, _, auth) = setup();
        let (_, token) =
            seed_account(storage.as_ref(), "a@example.com", Group::Regular, time::Duration::days(1)).await;
        storage.fail.store(true, Ordering::SeqCst);

        let err = auth.authenticate("a@example.com", &token).await.unwrap_err();
        assert_invalid_credentials(err);
    }

    #[tokio::test]
    async fn test_cached_principal_survives_storage_outage() {
        let (storage, _, auth) = setup();
        let (_, token) =
            seed_account(storage.as_ref(), "a@example.com", Group::Regular, time::Duration::days(1)).await;

        auth.authenticate("a@example.com", &token).await.unwrap();
        storage.fail.store(true, Ordering::SeqCst);

        assert!(auth.authenticate("a@example.com", &token).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_cache_entry_goes_back_to_store() {
        let storage = Arc::new(CountingStorage::default());
        let principals =
            PrincipalCache::new(Arc::new(SessionCache::new()), Duration::from_millis(1));
        let auth = Authenticator::new(storage.clone(), principals);
        let (_, token) =
            seed_account(storage.as_ref(), "a@example.com", Group::Regular, time::Duration::days(1)).await;

        auth.authenticate("a@example.com", &token).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        auth.authenticate("a@example.com", &token).await.unwrap();

        assert_eq!(storage.lookups(), (2, 2));
    }
}
