//! OAuth client management.
//!
//! Creates clients, looks them up and verifies their secrets.

pub mod registry;

// Re-export main types and services
pub use registry::{ClientRegistrationRequest, ClientRegistrationResponse, ClientRegistry};
