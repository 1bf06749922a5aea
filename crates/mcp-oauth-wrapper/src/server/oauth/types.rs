//! Credential records held by the [`OAuthStore`](super::OAuthStore).

use chrono::{DateTime, Utc};

/// A dynamically registered OAuth client. Never mutated after registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub client_id: String,
    pub client_secret: String,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub issued_at: DateTime<Utc>,
}

impl Client {
    /// Exact string membership; no URI normalization.
    #[must_use]
    pub fn has_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }
}

/// A single-use authorization code bound to the client and redirect URI it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationCode {
    /// Check if the code has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A bearer token accepted on the proxy route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub client_id: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Check if the token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
