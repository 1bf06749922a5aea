//! MCP OAuth Wrapper
//!
//! A minimal OAuth 2.0 authorization server that fronts an MCP server protected by a
//! single pre-provisioned credential. Client platforms that only speak standards-based
//! OAuth (discovery, dynamic registration, authorization-code exchange) obtain a
//! short-lived bearer token here, and their SSE stream is proxied to the backend with
//! the backend's own credential substituted for that token.
//!
//! # Features
//!
//! - **RFC 8414 discovery**, **RFC 7591 registration**, **RFC 6749 authorization code grant**
//! - **Single-use codes**: redemption is an atomic check-and-delete
//! - **Streaming proxy**: request and response bodies are relayed without buffering
//! - **Ephemeral state**: everything lives in process memory
//!
//! # Example
//!
//! ```no_run
//! use mcp_oauth_wrapper::{config::Config, server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     server::run_http(config).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod server;

pub use config::Config;
pub use error::{ConfigError, OAuthError};
pub use server::oauth::OAuthStore;
