//! Configuration for the OAuth wrapper.
//!
//! All settings come from the environment; the binary may override the port and
//! public URL from the command line.

use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

/// Environment variable names.
pub mod env {
    /// Listen port (set by the hosting platform).
    pub const PORT: &str = "PORT";
    /// Listen port fallback.
    pub const WRAPPER_PORT: &str = "OAUTH_WRAPPER_PORT";
    /// Public base URL of this issuer.
    pub const PUBLIC_URL: &str = "OAUTH_WRAPPER_PUBLIC_URL";
    /// Public base URL fallback provided by the hosting platform.
    pub const RUNWAY_APP_URL: &str = "RUNWAY_APP_URL";
    /// Backend MCP server host.
    pub const BACKEND_HOST: &str = "SLACK_MCP_HOST";
    /// Backend MCP server port.
    pub const BACKEND_PORT: &str = "SLACK_MCP_PORT";
    /// Credential injected on proxied requests.
    pub const BACKEND_API_KEY: &str = "SLACK_MCP_SSE_API_KEY";
    /// Upstream long-lived credential; the service refuses to start without it.
    pub const UPSTREAM_TOKEN: &str = "SLACK_MCP_XOXP_TOKEN";
}

/// Default values.
pub mod defaults {
    use std::time::Duration;

    /// Listen port.
    pub const PORT: u16 = 8080;
    /// Backend host.
    pub const BACKEND_HOST: &str = "127.0.0.1";
    /// Backend port.
    pub const BACKEND_PORT: u16 = 13080;
    /// Connect timeout for the backend leg.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    /// Timeout for the opportunistic backend health probe.
    pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Server configuration.
#[derive(Clone)]
pub struct Config {
    /// Listen port.
    pub port: u16,

    /// Public base URL of this issuer, without trailing slash.
    pub public_url: String,

    /// Base URL of the backend MCP server, without trailing slash.
    pub backend_url: String,

    /// Credential sent to the backend as `Authorization: Bearer <key>`.
    pub backend_api_key: Option<String>,

    /// Upstream long-lived credential. Only its presence is checked here; the backend uses it.
    pub upstream_token: String,

    /// Connect timeout for proxied requests.
    pub connect_timeout: Duration,

    /// Timeout for the backend health probe.
    pub health_probe_timeout: Duration,
}

impl Config {
    /// Create a configuration from explicit values.
    ///
    /// # Errors
    ///
    /// Returns error if the upstream credential is empty or a URL is not absolute.
    pub fn new(
        public_url: &str,
        backend_url: &str,
        upstream_token: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let upstream_token = upstream_token.into();
        if upstream_token.trim().is_empty() {
            return Err(ConfigError::MissingUpstreamToken { var: env::UPSTREAM_TOKEN });
        }

        Ok(Self {
            port: defaults::PORT,
            public_url: normalize_url("public URL", public_url)?,
            backend_url: normalize_url("backend URL", backend_url)?,
            backend_api_key: None,
            upstream_token,
            connect_timeout: defaults::CONNECT_TIMEOUT,
            health_probe_timeout: defaults::HEALTH_PROBE_TIMEOUT,
        })
    }

    /// Create a test configuration pointing at a mock backend.
    #[must_use]
    pub fn for_testing(backend_url: &str) -> Self {
        Self {
            port: 0,
            public_url: "https://example.com".to_string(),
            backend_url: backend_url.trim_end_matches('/').to_string(),
            backend_api_key: None,
            upstream_token: "xoxp-test".to_string(),
            connect_timeout: Duration::from_secs(2),
            health_probe_timeout: Duration::from_secs(1),
        }
    }

    /// Set the backend credential.
    #[must_use]
    pub fn with_backend_api_key(mut self, key: impl Into<String>) -> Self {
        self.backend_api_key = Some(key.into());
        self
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if the upstream credential is missing or a value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns error if the upstream credential is missing or a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let upstream_token = var(env::UPSTREAM_TOKEN)
            .ok_or(ConfigError::MissingUpstreamToken { var: env::UPSTREAM_TOKEN })?;

        let port = match (var(env::PORT), var(env::WRAPPER_PORT)) {
            (Some(value), _) => parse_port(env::PORT, &value)?,
            (None, Some(value)) => parse_port(env::WRAPPER_PORT, &value)?,
            (None, None) => defaults::PORT,
        };

        let public_url = var(env::PUBLIC_URL)
            .or_else(|| var(env::RUNWAY_APP_URL))
            .unwrap_or_else(|| format!("http://localhost:{port}"));

        let backend_host =
            var(env::BACKEND_HOST).unwrap_or_else(|| defaults::BACKEND_HOST.to_string());
        let backend_port = match var(env::BACKEND_PORT) {
            Some(value) => parse_port(env::BACKEND_PORT, &value)?,
            None => defaults::BACKEND_PORT,
        };

        let mut config = Self::new(
            &public_url,
            &format!("http://{backend_host}:{backend_port}"),
            upstream_token,
        )?;
        config.port = port;
        config.backend_api_key = var(env::BACKEND_API_KEY);
        Ok(config)
    }

    /// Replace the public URL.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is not absolute.
    pub fn set_public_url(&mut self, public_url: &str) -> Result<(), ConfigError> {
        self.public_url = normalize_url("public URL", public_url)?;
        Ok(())
    }

    /// Check if a backend credential is configured.
    #[must_use]
    pub const fn has_backend_api_key(&self) -> bool {
        self.backend_api_key.is_some()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("public_url", &self.public_url)
            .field("backend_url", &self.backend_url)
            .field("backend_api_key", &self.backend_api_key.as_ref().map(|_| "<redacted>"))
            .field("upstream_token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

fn parse_port(var: &'static str, value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidPort { var, value: value.to_string() })
}

fn normalize_url(name: &'static str, value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim().trim_end_matches('/');
    Url::parse(trimmed).map_err(|source| ConfigError::InvalidUrl { name, source })?;
    Ok(trimmed.to_string())
}
