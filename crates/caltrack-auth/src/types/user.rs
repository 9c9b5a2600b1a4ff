//! User accounts, groups and permissions.
//!
//! A [`User`] is the principal bound to an authenticated request. Every user
//! belongs to exactly one [`Group`], and the group decides which
//! [`Permission`]s the user holds.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// =============================================================================
// Permissions
// =============================================================================

/// Access to one component of the API.
///
/// The `All*` variants extend the permission to records owned by other
/// users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadUsers,
    ReadAllUsers,
    WriteUsers,
    WriteAllUsers,
    ReadMeals,
    ReadAllMeals,
    WriteMeals,
    WriteAllMeals,
}

impl Permission {
    /// Returns the permission name, e.g. `read:all_meals`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ReadUsers => "read:users",
            Self::ReadAllUsers => "read:all_users",
            Self::WriteUsers => "write:users",
            Self::WriteAllUsers => "write:all_users",
            Self::ReadMeals => "read:meals",
            Self::ReadAllMeals => "read:all_meals",
            Self::WriteMeals => "write:meals",
            Self::WriteAllMeals => "write:all_meals",
        }
    }

    /// Returns `true` if the permission covers records of every user.
    #[must_use]
    pub fn is_all(self) -> bool {
        matches!(
            self,
            Self::ReadAllUsers | Self::WriteAllUsers | Self::ReadAllMeals | Self::WriteAllMeals
        )
    }
}

// =============================================================================
// Groups
// =============================================================================

/// Named set of permissions assigned to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Group {
    /// Manages users and meals of everyone.
    Admin,
    /// Manages non-admin users; only their own meals.
    UserManager,
    /// Reads their own profile and manages their own meals.
    Regular,
}

const ADMIN_PERMISSIONS: &[Permission] = &[
    Permission::ReadAllUsers,
    Permission::WriteAllUsers,
    Permission::ReadAllMeals,
    Permission::WriteAllMeals,
];

const USER_MANAGER_PERMISSIONS: &[Permission] = &[
    Permission::ReadAllUsers,
    Permission::WriteAllUsers,
    Permission::ReadMeals,
    Permission::WriteMeals,
];

const REGULAR_PERMISSIONS: &[Permission] = &[
    Permission::ReadUsers,
    Permission::ReadMeals,
    Permission::WriteMeals,
];

impl Group {
    /// All groups, in id order.
    pub const ALL: [Group; 3] = [Group::Admin, Group::UserManager, Group::Regular];

    /// Stable numeric identifier of the group.
    #[must_use]
    pub fn id(self) -> i64 {
        match self {
            Self::Admin => 1,
            Self::UserManager => 2,
            Self::Regular => 3,
        }
    }

    /// Looks up a group by its numeric identifier.
    #[must_use]
    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|group| group.id() == id)
    }

    /// Permissions granted to members of this group.
    #[must_use]
    pub fn permissions(self) -> &'static [Permission] {
        match self {
            Self::Admin => ADMIN_PERMISSIONS,
            Self::UserManager => USER_MANAGER_PERMISSIONS,
            Self::Regular => REGULAR_PERMISSIONS,
        }
    }

    /// Returns `true` if members of this group hold `permission`.
    #[must_use]
    pub fn has_permission(self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    /// Whether a member of this group may move a user from `current` to
    /// `target`.
    ///
    /// Admins may change any group. User managers may not touch admins nor
    /// promote anyone to admin.
    #[must_use]
    pub fn can_modify_group(self, current: Group, target: Group) -> bool {
        match self {
            Self::Admin => true,
            Self::UserManager => current != Self::Admin && target != Self::Admin,
            Self::Regular => false,
        }
    }

    /// Whether a member of this group may reset the password of a member of
    /// `other`.
    #[must_use]
    pub fn can_reset_password(self, other: Group) -> bool {
        match self {
            Self::Admin => true,
            Self::UserManager => other == Self::Regular,
            Self::Regular => false,
        }
    }
}

// =============================================================================
// User
// =============================================================================

/// A user account and the principal of authenticated requests.
///
/// The password hash is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique identifier assigned by storage.
    pub id: i64,

    /// Lower-cased email address, used as the login name.
    pub email: String,

    /// Display name.
    pub name: String,

    /// Daily calorie target.
    #[serde(default)]
    pub expected_calories_per_day: i64,

    /// Argon2 PHC string of the user's password.
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    /// Group deciding the user's permissions.
    pub group: Group,

    /// Soft-delete marker. Deleted users cannot log in.
    #[serde(default)]
    pub deleted: bool,

    /// When the user was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the user was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    /// Returns `true` if the user holds `permission` through their group.
    #[must_use]
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.group.has_permission(permission)
    }

    /// Normalizes an email address the way it is stored.
    #[must_use]
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// Returns `true` if `email` has a non-empty local part and domain.
    ///
    /// Principal cache namespaces are emails, so anything failing this
    /// check can never address a principal entry.
    #[must_use]
    pub fn is_valid_email(email: &str) -> bool {
        email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty())
    }
}

/// Data required to create a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub expected_calories_per_day: i64,
    pub password_hash: String,
    pub group: Group,
}
