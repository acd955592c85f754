//! In-memory storage implementations
//!
//! This module provides in-memory implementations of all storage traits.
//! These implementations are suitable for development and testing.

mod accounts;
mod oauth;
mod session;

pub use accounts::MemoryAccountStorage;
pub use oauth::MemoryOAuthStorage;
pub use session::MemorySessionStorage;
