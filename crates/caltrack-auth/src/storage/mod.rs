//! Storage traits for account data.
//!
//! # Implementations
//!
//! - [`InMemoryAccountStorage`] - process-local store used by the server
//!   and by tests

pub mod account;
pub mod memory;

pub use account::{AccountStorage, AccountTransaction};
pub use memory::InMemoryAccountStorage;
