//! Axum HTTP surface for the authorization server.

pub mod context;
mod handler_accounts;
mod handler_health;
mod handler_oauth;
mod handler_oauth_authorize;
mod handler_oauth_clients;
mod handler_userinfo;
mod handler_well_known;
pub mod server;
mod utils_oauth;

pub use context::AppState;
pub use server::build_router;
