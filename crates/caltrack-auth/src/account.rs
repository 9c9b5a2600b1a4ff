//! Account operations that change credentials or the cached principal.
//!
//! Mutations run inside an [`AccountTransaction`]. Cached sessions are
//! invalidated or refreshed only after the transaction commits; a failed or
//! rolled-back mutation leaves the session cache untouched.

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::credentials::{generate_password, hash_password, validate_password, verify_password};
use crate::error::AuthError;
use crate::session::SessionManager;
use crate::storage::{AccountStorage, AccountTransaction};
use crate::types::{AccessToken, Group, IssuedToken, NewUser, Permission, User, split_token};

/// Profile fields a user may change.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub expected_calories_per_day: Option<i64>,
}

/// An account created on someone else's behalf.
///
/// Carries the generated password, which is not stored anywhere in clear.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAccount {
    #[serde(flatten)]
    pub issued: IssuedToken,
    pub generated_password: String,
}

/// Login, sign-out and credential mutations.
#[derive(Clone)]
pub struct AccountService {
    storage: Arc<dyn AccountStorage>,
    session: SessionManager,
}

impl AccountService {
    pub fn new(storage: Arc<dyn AccountStorage>, session: SessionManager) -> Self {
        Self { storage, session }
    }

    /// Creates a user with a hashed password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` for a short password, an invalid
    /// or taken email, or an empty name.
    pub async fn register(
        &self,
        email: &str,
        name: &str,
        password: &str,
        group: Group,
    ) -> AuthResult<User> {
        self.create_account(email, name, password, 0, group).await
    }

    /// Public sign-up. Creates a `Regular` user and logs them in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` for invalid account details or a
    /// taken email.
    pub async fn sign_up(
        &self,
        email: &str,
        name: &str,
        password: &str,
        expected_calories_per_day: i64,
    ) -> AuthResult<IssuedToken> {
        let user = self
            .create_account(email, name, password, expected_calories_per_day, Group::Regular)
            .await?;
        self.issue_token(user).await
    }

    /// Creates a user in `group_id` with a generated password and issues
    /// them a token.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for an unknown group id or invalid account details
    /// - `Forbidden` if the caller may not assign that group
    pub async fn create_user(
        &self,
        current_user: &User,
        email: &str,
        name: &str,
        expected_calories_per_day: i64,
        group_id: i64,
    ) -> AuthResult<CreatedAccount> {
        let group = Group::from_id(group_id)
            .ok_or_else(|| AuthError::invalid_request(format!("Unknown group id {group_id}")))?;
        if !current_user.group.can_modify_group(group, group) {
            return Err(AuthError::forbidden("Not allowed to create users in this group"));
        }

        let password = generate_password();
        let user = self
            .create_account(email, name, &password, expected_calories_per_day, group)
            .await?;
        tracing::info!(user_id = user.id, created_by = current_user.id, "User created");

        Ok(CreatedAccount {
            issued: self.issue_token(user).await?,
            generated_password: password,
        })
    }

    /// Looks a user up by email, ignoring case and surrounding whitespace.
    pub async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        self.storage
            .find_user_by_email(&User::normalize_email(email))
            .await
    }

    /// Verifies a password and issues a new access token.
    ///
    /// # Errors
    ///
    /// Returns the invalid-credentials error for an unknown email, a deleted
    /// user or a wrong password.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<IssuedToken> {
        let email = User::normalize_email(email);

        let user = match self.storage.find_user_by_email(&email).await? {
            Some(user) if !user.deleted => user,
            _ => {
                tracing::debug!(email = %email, "Login rejected: unknown or deleted user");
                return Err(AuthError::invalid_credentials());
            }
        };

        if !verify_password(password, &user.password_hash)? {
            tracing::debug!(email = %email, "Login rejected: wrong password");
            return Err(AuthError::invalid_credentials());
        }

        self.issue_token(user).await
    }

    async fn create_account(
        &self,
        email: &str,
        name: &str,
        password: &str,
        expected_calories_per_day: i64,
        group: Group,
    ) -> AuthResult<User> {
        validate_password(password)?;
        let email = User::normalize_email(email);
        if !User::is_valid_email(&email) {
            return Err(AuthError::invalid_request("A valid email is required"));
        }
        if name.trim().is_empty() {
            return Err(AuthError::invalid_request("Name cannot be empty"));
        }
        if expected_calories_per_day < 0 {
            return Err(AuthError::invalid_request(
                "Expected calories per day cannot be negative",
            ));
        }

        let user = self
            .storage
            .create_user(NewUser {
                email,
                name: name.to_string(),
                expected_calories_per_day,
                password_hash: hash_password(password)?,
                group,
            })
            .await?;

        tracing::info!(user_id = user.id, email = %user.email, group = ?user.group, "User registered");
        Ok(user)
    }

    async fn issue_token(&self, user: User) -> AuthResult<IssuedToken> {
        let value = AccessToken::generate_value();
        let lifetime = time::Duration::try_from(self.session.config().token_lifetime)
            .map_err(|e| AuthError::configuration(format!("Invalid token lifetime: {e}")))?;
        let record = self
            .storage
            .insert_token(
                user.id,
                AccessToken::hash_token(&value),
                OffsetDateTime::now_utc() + lifetime,
            )
            .await?;

        tracing::info!(user_id = user.id, token_id = record.id, "Issued access token");

        Ok(IssuedToken {
            token: record.encode(&value),
            token_expiration: record.expires_at,
            user,
        })
    }

    /// Deletes the token the caller authenticated with.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Forbidden` if the token belongs to someone else.
    pub async fn sign_out(&self, current_user: &User, token: &str) -> AuthResult<()> {
        let parts = split_token(token)?;

        let record = self
            .storage
            .find_token(parts.id)
            .await?
            .filter(|record| record.has_value(&parts.value))
            .ok_or_else(AuthError::invalid_credentials)?;

        if record.user_id != current_user.id {
            return Err(AuthError::forbidden("Token belongs to another user"));
        }

        self.storage.revoke_token(record.id).await?;
        self.session
            .principals()
            .evict(&current_user.email, token);

        tracing::info!(user_id = current_user.id, token_id = record.id, "Signed out");
        Ok(())
    }

    /// Changes a user's password and revokes all their tokens.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if `old_password` does not match
    /// - `Forbidden` if the caller may not reset this user's password
    /// - `NotFound` if the user does not exist
    pub async fn reset_password(
        &self,
        current_user: &User,
        user_id: i64,
        old_password: &str,
        new_password: &str,
    ) -> AuthResult<User> {
        validate_password(new_password)?;
        let mut tx = self.storage.begin().await?;

        let result = async {
            let mut target = load_user(tx.as_mut(), user_id).await?;

            if current_user.id != target.id
                && !current_user.group.can_reset_password(target.group)
            {
                return Err(AuthError::forbidden(
                    "Not allowed to reset this user's password",
                ));
            }
            if !verify_password(old_password, &target.password_hash)? {
                return Err(AuthError::invalid_request("Invalid old password"));
            }

            target.password_hash = hash_password(new_password)?;
            tx.update_user(&target).await?;
            let revoked = tx.delete_tokens_for_user(target.id).await?;
            Ok::<_, AuthError>((target, revoked))
        }
        .await;

        let (target, revoked) = finish(tx, result).await?;
        let invalidated = self.session.invalidate_principal_sessions(&target);

        tracing::info!(
            user_id = target.id,
            changed_by = current_user.id,
            revoked,
            invalidated,
            "Password reset"
        );
        Ok(target)
    }

    /// Moves a user to another group and revokes all their tokens.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for an unknown group id
    /// - `Forbidden` if the caller may not make this change
    /// - `NotFound` if the user does not exist
    pub async fn change_group(
        &self,
        current_user: &User,
        user_id: i64,
        group_id: i64,
    ) -> AuthResult<User> {
        let group = Group::from_id(group_id)
            .ok_or_else(|| AuthError::invalid_request(format!("Unknown group id {group_id}")))?;
        let mut tx = self.storage.begin().await?;

        let result = async {
            let mut target = load_user(tx.as_mut(), user_id).await?;

            if !current_user.group.can_modify_group(target.group, group) {
                return Err(AuthError::forbidden("Not allowed to change this user's group"));
            }

            target.group = group;
            tx.update_user(&target).await?;
            let revoked = tx.delete_tokens_for_user(target.id).await?;
            Ok::<_, AuthError>((target, revoked))
        }
        .await;

        let (target, revoked) = finish(tx, result).await?;
        let invalidated = self.session.invalidate_principal_sessions(&target);

        tracing::info!(
            user_id = target.id,
            changed_by = current_user.id,
            group = ?target.group,
            revoked,
            invalidated,
            "Group changed"
        );
        Ok(target)
    }

    /// Updates name and calorie target, refreshing cached sessions.
    ///
    /// # Errors
    ///
    /// - `Forbidden` if the caller may not write this user
    /// - `InvalidRequest` for an empty name or negative calorie target
    /// - `NotFound` if the user does not exist
    pub async fn update_profile(
        &self,
        current_user: &User,
        user_id: i64,
        update: ProfileUpdate,
    ) -> AuthResult<User> {
        if current_user.id != user_id && !current_user.has_permission(Permission::WriteAllUsers) {
            return Err(AuthError::forbidden("Not allowed to update this user"));
        }
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(AuthError::invalid_request("Name cannot be empty"));
        }
        if update.expected_calories_per_day.is_some_and(|c| c < 0) {
            return Err(AuthError::invalid_request(
                "Expected calories per day cannot be negative",
            ));
        }

        let mut tx = self.storage.begin().await?;
        let result = async {
            let mut target = load_user(tx.as_mut(), user_id).await?;
            if target.group == Group::Admin
                && current_user.id != target.id
                && current_user.group != Group::Admin
            {
                return Err(AuthError::forbidden("Not allowed to update an admin"));
            }

            if let Some(name) = update.name {
                target.name = name;
            }
            if let Some(calories) = update.expected_calories_per_day {
                target.expected_calories_per_day = calories;
            }
            tx.update_user(&target).await?;
            Ok::<_, AuthError>(target)
        }
        .await;

        let target = finish(tx, result).await?;
        let refreshed = self.session.refresh_principal_sessions(&target);

        tracing::info!(user_id = target.id, changed_by = current_user.id, refreshed, "Profile updated");
        Ok(target)
    }
}

async fn load_user(tx: &mut dyn AccountTransaction, user_id: i64) -> AuthResult<User> {
    tx.find_user_by_id(user_id)
        .await?
        .filter(|user| !user.deleted)
        .ok_or_else(|| AuthError::not_found(format!("User {user_id} not found")))
}

/// Commits on success, rolls back on failure.
async fn finish<T>(tx: Box<dyn AccountTransaction>, result: AuthResult<T>) -> AuthResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed");
            }
            Err(e)
        }
    }
}
