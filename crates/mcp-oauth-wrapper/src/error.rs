//! Error types for the OAuth wrapper.
//!
//! Uses `thiserror` for structured error handling. Request-level failures map onto
//! HTTP responses through [`IntoResponse`]; startup failures are [`ConfigError`]s.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

/// Client-input errors raised by the OAuth endpoints and the bearer validator.
///
/// None of these are retried or fatal; each becomes a 400/401/405 response.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OAuthError {
    /// `client_id` on an authorization request does not resolve to a registered client.
    #[error("unknown client_id")]
    UnknownClient,

    /// Token endpoint client authentication failed (unknown id or wrong secret).
    #[error("invalid client credentials")]
    InvalidClient,

    /// `redirect_uri` is not one of the client's registered URIs.
    #[error("redirect_uri is not registered for this client")]
    InvalidRedirect,

    /// `response_type` other than `code`.
    #[error("response_type must be 'code'")]
    UnsupportedResponseType,

    /// `grant_type` other than `authorization_code`.
    #[error("grant_type must be 'authorization_code'")]
    UnsupportedGrantType,

    /// Authorization code missing, already consumed, mismatched or expired.
    #[error("{0}")]
    InvalidGrant(&'static str),

    /// Missing, malformed, unknown or expired bearer token on the proxy route.
    #[error("invalid or expired access token")]
    Unauthorized,

    /// Request body could not be decoded or is missing required metadata.
    #[error("{0}")]
    MalformedRequest(String),

    /// Endpoint does not accept the request method.
    #[error("method not allowed")]
    MethodNotAllowed,
}

impl OAuthError {
    /// Create a malformed request error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest(message.into())
    }

    /// HTTP status code for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidClient | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Machine-readable error code placed in the `error` field of the response body.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownClient | Self::InvalidClient => "invalid_client",
            Self::InvalidRedirect => "invalid_redirect_uri",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::Unauthorized => "invalid_token",
            Self::MalformedRequest(_) => "invalid_request",
            Self::MethodNotAllowed => "method_not_allowed",
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let mut response = (
            self.status(),
            Json(serde_json::json!({
                "error": self.error_code(),
                "error_description": self.to_string()
            })),
        )
            .into_response();

        let challenge = match self {
            Self::InvalidClient => Some(HeaderValue::from_static("Basic")),
            Self::Unauthorized => Some(HeaderValue::from_static(r#"Bearer error="invalid_token""#)),
            _ => None,
        };
        if let Some(challenge) = challenge {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, challenge);
        }

        response
    }
}

/// Errors resolving configuration at startup. Any of these stops the process before it binds.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The upstream long-lived credential is absent or empty.
    #[error("{var} environment variable is required")]
    MissingUpstreamToken {
        /// Variable that should carry the credential
        var: &'static str,
    },

    /// A port variable is not a valid `u16`.
    #[error("invalid port in {var}: {value:?}")]
    InvalidPort {
        /// Variable name
        var: &'static str,
        /// Offending value
        value: String,
    },

    /// A URL setting does not parse as an absolute URL.
    #[error("invalid URL for {name}: {source}")]
    InvalidUrl {
        /// Setting name
        name: &'static str,
        /// Parse failure
        #[source]
        source: url::ParseError,
    },
}

/// Result type alias for OAuth operations.
pub type OAuthResult<T> = Result<T, OAuthError>;
