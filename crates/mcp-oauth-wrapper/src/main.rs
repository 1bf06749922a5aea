//! MCP OAuth Wrapper - Entry Point
//!
//! Resolves configuration from the environment, refuses to start without the upstream
//! credential, then serves the OAuth endpoints and the protected SSE proxy.

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use mcp_oauth_wrapper::{config::Config, server};

#[derive(Parser, Debug)]
#[command(name = "mcp-oauth-wrapper")]
#[command(about = "OAuth 2.0 wrapper and SSE proxy for a credential-protected MCP server")]
#[command(version)]
struct Cli {
    /// Listen port (overrides PORT / OAUTH_WRAPPER_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Public base URL of this issuer (overrides OAUTH_WRAPPER_PUBLIC_URL / RUNWAY_APP_URL)
    #[arg(long)]
    public_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    if let Some(port) = cli.port {
        // Keep the localhost default in step with the overridden port.
        if config.public_url == format!("http://localhost:{}", config.port) {
            config.set_public_url(&format!("http://localhost:{port}"))?;
        }
        config.port = port;
    }
    if let Some(ref public_url) = cli.public_url {
        config.set_public_url(public_url)?;
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting MCP OAuth wrapper");

    server::run_http(config).await
}
