//! In-memory account storage.
//!
//! Transactions buffer their operations and apply them all under one write
//! lock on commit. A transaction that is rolled back or dropped leaves the
//! store untouched.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::{AccountStorage, AccountTransaction};
use crate::types::{AccessToken, NewUser, User};

#[derive(Debug, Default)]
struct State {
    users: HashMap<i64, User>,
    tokens: HashMap<i64, AccessToken>,
    next_user_id: i64,
    next_token_id: i64,
}

impl State {
    fn next_user_id(&mut self) -> i64 {
        self.next_user_id += 1;
        self.next_user_id
    }

    fn next_token_id(&mut self) -> i64 {
        self.next_token_id += 1;
        self.next_token_id
    }

    fn delete_tokens_for_user(&mut self, user_id: i64) -> u64 {
        let mut deleted = 0;
        for token in self.tokens.values_mut() {
            if token.user_id == user_id && !token.deleted {
                token.deleted = true;
                deleted += 1;
            }
        }
        deleted
    }
}

/// Process-local [`AccountStorage`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccountStorage {
    state: Arc<RwLock<State>>,
}

impl InMemoryAccountStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users, deleted ones included.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.state.read().users.len()
    }

    /// Number of token records that are not deleted.
    #[must_use]
    pub fn active_token_count(&self, user_id: i64) -> usize {
        self.state
            .read()
            .tokens
            .values()
            .filter(|t| t.user_id == user_id && !t.deleted)
            .count()
    }
}

#[async_trait]
impl AccountStorage for InMemoryAccountStorage {
    async fn find_user_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        Ok(self
            .state
            .read()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_user_by_id(&self, id: i64) -> AuthResult<Option<User>> {
        Ok(self.state.read().users.get(&id).cloned())
    }

    async fn create_user(&self, user: NewUser) -> AuthResult<User> {
        let email = User::normalize_email(&user.email);
        let mut state = self.state.write();

        if state.users.values().any(|u| u.email == email) {
            return Err(AuthError::invalid_request(format!(
                "User with email '{email}' already exists"
            )));
        }

        let now = OffsetDateTime::now_utc();
        let created = User {
            id: state.next_user_id(),
            email,
            name: user.name,
            expected_calories_per_day: user.expected_calories_per_day,
            password_hash: user.password_hash,
            group: user.group,
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_token(&self, id: i64) -> AuthResult<Option<AccessToken>> {
        Ok(self.state.read().tokens.get(&id).cloned())
    }

    async fn insert_token(
        &self,
        user_id: i64,
        token_hash: String,
        expires_at: OffsetDateTime,
    ) -> AuthResult<AccessToken> {
        let mut state = self.state.write();
        if !state.users.contains_key(&user_id) {
            return Err(AuthError::not_found(format!("User {user_id} not found")));
        }

        let token = AccessToken {
            id: state.next_token_id(),
            user_id,
            token_hash,
            created_at: OffsetDateTime::now_utc(),
            expires_at,
            deleted: false,
        };
        state.tokens.insert(token.id, token.clone());
        Ok(token)
    }

    async fn revoke_token(&self, id: i64) -> AuthResult<bool> {
        let mut state = self.state.write();
        match state.tokens.get_mut(&id) {
            Some(token) if !token.deleted => {
                token.deleted = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn begin(&self) -> AuthResult<Box<dyn AccountTransaction>> {
        Ok(Box::new(InMemoryAccountTransaction::new(Arc::clone(
            &self.state,
        ))))
    }
}

enum TransactionOp {
    UpdateUser(User),
    DeleteTokens { user_id: i64 },
}

/// Transaction over [`InMemoryAccountStorage`].
///
/// Operations are collected and applied on commit.
pub struct InMemoryAccountTransaction {
    state: Arc<RwLock<State>>,
    operations: Vec<TransactionOp>,
}

impl InMemoryAccountTransaction {
    fn new(state: Arc<RwLock<State>>) -> Self {
        Self {
            state,
            operations: Vec::new(),
        }
    }
}

#[async_trait]
impl AccountTransaction for InMemoryAccountTransaction {
    async fn find_user_by_id(&mut self, id: i64) -> AuthResult<Option<User>> {
        let pending = self.operations.iter().rev().find_map(|op| match op {
            TransactionOp::UpdateUser(user) if user.id == id => Some(user.clone()),
            _ => None,
        });

        match pending {
            Some(user) => Ok(Some(user)),
            None => Ok(self.state.read().users.get(&id).cloned()),
        }
    }

    async fn update_user(&mut self, user: &User) -> AuthResult<()> {
        if !self.state.read().users.contains_key(&user.id) {
            return Err(AuthError::not_found(format!("User {} not found", user.id)));
        }
        self.operations.push(TransactionOp::UpdateUser(user.clone()));
        Ok(())
    }

    async fn delete_tokens_for_user(&mut self, user_id: i64) -> AuthResult<u64> {
        let affected = self
            .state
            .read()
            .tokens
            .values()
            .filter(|t| t.user_id == user_id && !t.deleted)
            .count() as u64;
        self.operations.push(TransactionOp::DeleteTokens { user_id });
        Ok(affected)
    }

    async fn commit(self: Box<Self>) -> AuthResult<()> {
        let this = *self;
        let mut state = this.state.write();
        for op in this.operations {
            match op {
                TransactionOp::UpdateUser(mut user) => {
                    user.updated_at = OffsetDateTime::now_utc();
                    state.users.insert(user.id, user);
                }
                TransactionOp::DeleteTokens { user_id } => {
                    state.delete_tokens_for_user(user_id);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AuthResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Group;
    use time::Duration;
    use tokio_test::block_on;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            name: "Test".to_string(),
            expected_calories_per_day: 2000,
            password_hash: "hash".to_string(),
            group: Group::Regular,
        }
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let storage = InMemoryAccountStorage::new();
        let user = storage.create_user(new_user("Jane@Example.com")).await.unwrap();

        assert_eq!(user.id, 1);
        assert_eq!(user.email, "jane@example.com");

        let found = storage.find_user_by_email("jane@example.com").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(1));
        assert!(storage.find_user_by_id(2).await.unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let storage = InMemoryAccountStorage::new();
        block_on(async {
            storage.create_user(new_user("a@example.com")).await.unwrap();
            let err = storage
                .create_user(new_user("A@example.com"))
                .await
                .unwrap_err();
            assert!(err.is_client_error());
        });
        assert_eq!(storage.user_count(), 1);
    }

    #[tokio::test]
    async fn test_insert_and_revoke_token() {
        let storage = InMemoryAccountStorage::new();
        let user = storage.create_user(new_user("a@example.com")).await.unwrap();
        let expires_at = OffsetDateTime::now_utc() + Duration::days(1);

        let token = storage
            .insert_token(user.id, "hash".to_string(), expires_at)
            .await
            .unwrap();
        assert!(storage.find_token(token.id).await.unwrap().unwrap().is_valid());

        assert!(storage.revoke_token(token.id).await.unwrap());
        assert!(!storage.revoke_token(token.id).await.unwrap());
        assert!(storage.find_token(token.id).await.unwrap().unwrap().deleted);
        assert!(!storage.revoke_token(999).await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_token_for_unknown_user() {
        let storage = InMemoryAccountStorage::new();
        let expires_at = OffsetDateTime::now_utc() + Duration::days(1);
        let err = storage
            .insert_token(9, "hash".to_string(), expires_at)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_transaction_commit_applies_changes() {
        let storage = InMemoryAccountStorage::new();
        let mut user = storage.create_user(new_user("a@example.com")).await.unwrap();
        let expires_at = OffsetDateTime::now_utc() + Duration::days(1);
        storage.insert_token(user.id, "h1".into(), expires_at).await.unwrap();
        storage.insert_token(user.id, "h2".into(), expires_at).await.unwrap();

        let mut tx = storage.begin().await.unwrap();
        user.name = "Renamed".to_string();
        tx.update_user(&user).await.unwrap();
        assert_eq!(tx.delete_tokens_for_user(user.id).await.unwrap(), 2);

        // Visible inside the transaction, not outside
        let inside = tx.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(inside.name, "Renamed");
        let outside = storage.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(outside.name, "Test");
        assert_eq!(storage.active_token_count(user.id), 2);

        tx.commit().await.unwrap();

        let after = storage.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(after.name, "Renamed");
        assert_eq!(storage.active_token_count(user.id), 0);
    }

    #[tokio::test]
    async fn test_transaction_rollback_and_drop_discard_changes() {
        let storage = InMemoryAccountStorage::new();
        let mut user = storage.create_user(new_user("a@example.com")).await.unwrap();
        user.name = "Renamed".to_string();

        let mut tx = storage.begin().await.unwrap();
        tx.update_user(&user).await.unwrap();
        tx.rollback().await.unwrap();

        {
            let mut tx = storage.begin().await.unwrap();
            tx.update_user(&user).await.unwrap();
        }

        let stored = storage.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Test");
    }

    #[tokio::test]
    async fn test_transaction_update_unknown_user() {
        let storage = InMemoryAccountStorage::new();
        let ghost = storage.create_user(new_user("a@example.com")).await.unwrap();
        let other = InMemoryAccountStorage::new();

        let mut tx = other.begin().await.unwrap();
        let err = tx.update_user(&ghost).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound { .. }));
    }
}
