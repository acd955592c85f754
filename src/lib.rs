//! oaks: an OAuth 2.0 authorization server library.
//!
//! Issues, validates and revokes authorization codes, access tokens and
//! refresh tokens for registered clients acting on behalf of end users.

pub mod config;
pub mod errors;
pub mod http;
pub mod oauth;
pub mod storage;
