//! Fuzzing library for mcp-oauth-wrapper.
//!
//! Targets cover the two places untrusted input is parsed before any credential
//! check: the dynamic registration body and the authorization redirect target.
//!
//! # Usage
//!
//! ```bash
//! cd crates/sentinel-fuzz
//! cargo +nightly fuzz run fuzz_redirect_build -- -max_total_time=60
//! ```

pub use mcp_oauth_wrapper::server::oauth;
