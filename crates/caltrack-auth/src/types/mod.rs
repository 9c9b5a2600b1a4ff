//! Domain types for accounts and sessions.

pub mod token;
pub mod user;

pub use token::{AccessToken, IssuedToken, TOKEN_SEPARATOR, TokenParts, split_token};
pub use user::{Group, NewUser, Permission, User};
