//! OAuth 2.0 authorization server for MCP client platforms.
//!
//! Issues short-lived bearer tokens that stand in for the backend's single
//! long-lived credential.
//!
//! ## Supported Standards
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration
//! - RFC 6749: Authorization Code Grant (`client_secret_post`, `client_secret_basic`)

pub mod clock;
pub mod handlers;
pub mod store;
mod types;

pub use clock::{SystemTimeProvider, TimeProvider};
pub use store::OAuthStore;
pub use types::{AccessToken, AuthorizationCode, Client};
