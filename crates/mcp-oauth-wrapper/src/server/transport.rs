//! HTTP transport: shared state, route table and liveness endpoints.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{any, get, post},
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::oauth::{OAuthStore, handlers};
use super::proxy::{self, BackendProxy};
use crate::config::Config;

/// Route paths served by the wrapper.
pub mod paths {
    /// RFC 8414 discovery document.
    pub const DISCOVERY: &str = "/.well-known/oauth-authorization-server";
    /// RFC 7591 dynamic client registration.
    pub const REGISTER: &str = "/register";
    /// Authorization endpoint.
    pub const AUTHORIZE: &str = "/authorize";
    /// Informational OAuth callback.
    pub const CALLBACK: &str = "/oauth/callback";
    /// Token endpoint.
    pub const TOKEN: &str = "/token";
    /// Protected streaming route, proxied to the backend path of the same name.
    pub const SSE: &str = "/sse";
    /// Liveness probe (also the backend's probe path).
    pub const HEALTH: &str = "/health";
    /// Readiness with store statistics.
    pub const READY: &str = "/ready";
}

/// Shared state for HTTP handlers.
pub struct HttpState {
    /// Resolved process configuration.
    pub config: Config,
    /// Clients, codes and tokens.
    pub store: OAuthStore,
    /// Connection to the backend MCP server.
    pub backend: BackendProxy,
}

impl HttpState {
    /// Build handler state around an existing store.
    ///
    /// # Errors
    ///
    /// Returns error if the backend HTTP client cannot be built from `config`.
    pub fn new(config: Config, store: OAuthStore) -> anyhow::Result<Self> {
        let backend = BackendProxy::new(&config)?;
        Ok(Self { config, store, backend })
    }
}

impl std::fmt::Debug for HttpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpState").field("config", &self.config).finish_non_exhaustive()
    }
}

/// Create the HTTP router.
pub fn create_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route(paths::HEALTH, get(health_check))
        .route(paths::READY, get(readiness_check))
        .route(paths::DISCOVERY, get(handlers::handle_auth_server_metadata))
        .route(
            paths::REGISTER,
            post(handlers::handle_register).fallback(handlers::method_not_allowed),
        )
        .route(paths::AUTHORIZE, get(handlers::handle_authorize_get))
        .route(paths::CALLBACK, get(handlers::handle_callback))
        .route(paths::TOKEN, post(handlers::handle_token).fallback(handlers::method_not_allowed))
        .route(paths::SSE, any(proxy::handle_sse_proxy))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "mcp-oauth-wrapper",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn readiness_check(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (clients, codes, tokens) = state.store.counts().await;
    Json(serde_json::json!({
        "status": "ready",
        "service": "mcp-oauth-wrapper",
        "version": env!("CARGO_PKG_VERSION"),
        "clients": clients,
        "authorization_codes": codes,
        "access_tokens": tokens
    }))
}
