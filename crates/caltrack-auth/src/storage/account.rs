//! Account storage traits.
//!
//! The relational persistence layer lives outside this crate. Authentication
//! and account mutations reach it only through these two traits.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::{AccessToken, NewUser, User};

/// Storage trait for users and their access tokens.
///
/// Lookups return records regardless of deletion or expiry; callers decide
/// whether a record is usable.
#[async_trait]
pub trait AccountStorage: Send + Sync {
    /// Finds a user by lower-cased email.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_user_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Finds a user by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_user_by_id(&self, id: i64) -> AuthResult<Option<User>>;

    /// Creates a user and returns it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` if the email is already taken.
    async fn create_user(&self, user: NewUser) -> AuthResult<User>;

    /// Finds a token record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_token(&self, id: i64) -> AuthResult<Option<AccessToken>>;

    /// Stores a new token record for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be stored.
    async fn insert_token(
        &self,
        user_id: i64,
        token_hash: String,
        expires_at: OffsetDateTime,
    ) -> AuthResult<AccessToken>;

    /// Marks a token deleted.
    ///
    /// Returns `false` if the token does not exist or was already deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_token(&self, id: i64) -> AuthResult<bool>;

    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started.
    async fn begin(&self) -> AuthResult<Box<dyn AccountTransaction>>;
}

/// A unit of account mutations applied atomically on [`commit`].
///
/// Dropping a transaction without committing discards its changes.
///
/// [`commit`]: AccountTransaction::commit
#[async_trait]
pub trait AccountTransaction: Send {
    /// Finds a user by id, seeing changes made earlier in this transaction.
    async fn find_user_by_id(&mut self, id: i64) -> AuthResult<Option<User>>;

    /// Replaces the stored user with the same id.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if no such user exists.
    async fn update_user(&mut self, user: &User) -> AuthResult<()>;

    /// Deletes every token of `user_id`, returning how many were affected.
    async fn delete_tokens_for_user(&mut self, user_id: i64) -> AuthResult<u64>;

    /// Applies the transaction.
    async fn commit(self: Box<Self>) -> AuthResult<()>;

    /// Discards the transaction.
    async fn rollback(self: Box<Self>) -> AuthResult<()>;
}
