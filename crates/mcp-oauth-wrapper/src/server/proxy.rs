//! Bearer validation and the credential-translating streaming proxy.
//!
//! A request to the protected route is admitted only with a live access token. The
//! token is then stripped, the backend credential injected, and the request and
//! response bodies are relayed as streams so long-lived SSE connections flow through
//! chunk by chunk. Backend failures are never retried.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, HttpBody},
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use futures::TryStreamExt;
use url::Url;

use super::oauth::{AccessToken, OAuthStore};
use super::transport::{HttpState, paths};
use crate::config::Config;
use crate::error::{OAuthError, OAuthResult};

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Resolve the bearer token on a request to a live access token.
pub async fn authenticate(store: &OAuthStore, headers: &HeaderMap) -> OAuthResult<AccessToken> {
    let Some(auth) = headers.typed_get::<Authorization<Bearer>>() else {
        return Err(OAuthError::Unauthorized);
    };

    let Some(token) = store.get_token(auth.token()).await else {
        return Err(OAuthError::Unauthorized);
    };

    if token.is_expired_at(store.now()) {
        return Err(OAuthError::Unauthorized);
    }

    Ok(token)
}

/// `* /sse`
pub async fn handle_sse_proxy(State(state): State<Arc<HttpState>>, request: Request) -> Response {
    let token = match authenticate(&state.store, request.headers()).await {
        Ok(token) => token,
        Err(err) => {
            tracing::warn!(error = err.error_code(), "Rejected proxy request");
            return err.into_response();
        }
    };

    tracing::debug!(
        client_id = %token.client_id,
        method = %request.method(),
        "Proxying request to backend"
    );

    state.backend.spawn_health_probe();
    state.backend.forward(request).await
}

/// Connection to the backend MCP server.
#[derive(Clone)]
pub struct BackendProxy {
    client: reqwest::Client,
    stream_url: Url,
    health_url: Url,
    credential: Option<HeaderValue>,
    health_probe_timeout: Duration,
}

impl BackendProxy {
    /// Create a proxy for the backend named in `config`.
    ///
    /// # Errors
    ///
    /// Returns error if the backend URL or credential is invalid, or the HTTP client
    /// cannot be built.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        // No total timeout: the event stream stays open as long as the backend keeps it open.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let credential = match config.backend_api_key.as_deref() {
            Some(key) => {
                let mut value = HeaderValue::from_str(&format!("Bearer {key}"))?;
                value.set_sensitive(true);
                Some(value)
            }
            None => None,
        };

        Ok(Self {
            client,
            stream_url: Url::parse(&format!("{}{}", config.backend_url, paths::SSE))?,
            health_url: Url::parse(&format!("{}{}", config.backend_url, paths::HEALTH))?,
            credential,
            health_probe_timeout: config.health_probe_timeout,
        })
    }

    /// Probe the backend's health endpoint in the background.
    ///
    /// A failed probe is only logged; it never blocks or fails the proxied request.
    pub fn spawn_health_probe(&self) {
        let client = self.client.clone();
        let url = self.health_url.clone();
        let timeout = self.health_probe_timeout;

        tokio::spawn(async move {
            match client.get(url.clone()).timeout(timeout).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::trace!(backend = %url, "Backend health probe ok");
                }
                Ok(resp) => {
                    tracing::warn!(
                        backend = %url,
                        status = resp.status().as_u16(),
                        "MCP server may not be running"
                    );
                }
                Err(e) => {
                    tracing::warn!(backend = %url, error = %e, "MCP server may not be running");
                }
            }
        });
    }

    /// Forward a request to the backend stream endpoint and relay the response.
    ///
    /// Everything except the `Authorization` header and hop-by-hop headers passes
    /// through unchanged. A transport failure becomes `502 Bad Gateway`.
    pub async fn forward(&self, request: Request) -> Response {
        let (parts, body) = request.into_parts();

        let mut url = self.stream_url.clone();
        url.set_query(parts.uri.query());

        let mut headers = forwardable_headers(&parts.headers);
        headers.remove(header::HOST);
        headers.remove(header::AUTHORIZATION);
        if let Some(ref credential) = self.credential {
            headers.insert(header::AUTHORIZATION, credential.clone());
        }
        if let Some(ConnectInfo(peer)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            append_forwarded_for(&mut headers, peer);
        }

        let mut outbound = self.client.request(parts.method, url).headers(headers);
        if body.size_hint().exact() != Some(0) {
            outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        match outbound.send().await {
            Ok(upstream) => relay(upstream),
            Err(e) => {
                tracing::error!(backend = %self.stream_url, error = %e, "Backend request failed");
                StatusCode::BAD_GATEWAY.into_response()
            }
        }
    }
}

impl std::fmt::Debug for BackendProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendProxy")
            .field("stream_url", &self.stream_url.as_str())
            .field("credential", &self.credential.is_some())
            .finish_non_exhaustive()
    }
}

/// Turn a backend response into ours without buffering its body.
fn relay(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let headers = forwardable_headers(upstream.headers());

    let stream = upstream
        .bytes_stream()
        .inspect_err(|e| tracing::debug!(error = %e, "Backend stream closed with error"));

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Copy `headers` minus hop-by-hop headers, including any named by `Connection`.
fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let connection_scoped: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    headers
        .iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            !HOP_BY_HOP.contains(&name) && !connection_scoped.iter().any(|scoped| scoped == name)
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn append_forwarded_for(headers: &mut HeaderMap, peer: &SocketAddr) {
    let forwarded = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{prior}, {}", peer.ip()),
        None => peer.ip().to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
