//! HTTP server: OAuth endpoints plus the protected SSE proxy.
//!
//! All credential state lives in one [`OAuthStore`](oauth::OAuthStore) for the life of
//! the process; nothing is persisted, so a restart invalidates every client and token.

pub mod oauth;
pub mod proxy;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Config;
use oauth::OAuthStore;
use transport::HttpState;

/// Run the wrapper until Ctrl+C.
///
/// # Errors
///
/// Returns error if the backend client cannot be built or the listener fails.
pub async fn run_http(config: Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    tracing::info!(
        port = config.port,
        public_url = %config.public_url,
        backend_url = %config.backend_url,
        backend_credential = config.has_backend_api_key(),
        "Starting OAuth wrapper"
    );

    let state = Arc::new(HttpState::new(config, OAuthStore::new())?);
    let router = transport::create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server shut down");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
