mod config;
mod health;
mod http;
mod metrics;
mod pipeline;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, ConfigArgs};
use crate::http::gate::AdmissionGate;
use crate::metrics::MetricsRegistry;
use crate::pipeline::{ContentFetcher, HttpFetcher, Resolver};

const USER_AGENT: &str = concat!("pipeline-resolver/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "pipeline-resolver",
    about = "Woodpecker CI config extension serving per-branch pipelines"
)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// State shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub http_client: reqwest::Client,
    pub gate: AdmissionGate,
    pub resolver: Arc<Resolver>,
    pub metrics: MetricsRegistry,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.fetch_timeout)
            .build()
            .context("failed to build reqwest client")?;

        let metrics = MetricsRegistry::new();
        let fetcher: Arc<dyn ContentFetcher> = Arc::new(HttpFetcher::new(http_client.clone()));
        let resolver = Resolver::from_config(&config, fetcher, Arc::clone(&metrics.metrics));

        Ok(Self {
            gate: AdmissionGate::new(config.override_filter.clone()),
            config: Arc::new(config),
            http_client,
            resolver: Arc::new(resolver),
            metrics,
        })
    }
}

// ---------------------------------------------------------------------------
// HTTP server (axum)
// ---------------------------------------------------------------------------

async fn run_http_server(state: AppState) -> Result<()> {
    let listener = bind_listener(&state.config.listen).await?;
    let app = http::handler::create_router(Arc::new(state));

    let listen_addr = listener.local_addr().context("listener has no local address")?;
    tracing::info!(%listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    Ok(())
}

/// Bind `listen`, resolving a host name if one is given.
async fn bind_listener(listen: &str) -> Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {listen}"))
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- .env (must be loaded before clap reads the environment) ----
    let dotenv = dotenvy::dotenv();

    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    match dotenv {
        Ok(path) => tracing::info!(path = %path.display(), "loaded .env file"),
        Err(e) => tracing::info!(error = %e, "no loadable .env file"),
    }

    // ---- Config ----
    let config = config::load_config(&cli.config)?;
    tracing::info!(
        listen = %config.listen,
        configs_repo = %config.configs.root(),
        pipelines_repo = %config.pipelines.root(),
        override_filter = %config.override_filter,
        special_platform_filter = %config.special_platform_filter,
        "starting pipeline-resolver"
    );

    // ---- App state ----
    let state = AppState::new(config)?;

    run_http_server(state).await?;

    tracing::info!("pipeline-resolver shut down cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_host_name_address() {
        let listener = bind_listener("localhost:0").await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    async fn unresolvable_host_is_a_bind_error() {
        let err = bind_listener("no-such-host.invalid:8000").await.unwrap_err();
        assert!(err.to_string().contains("failed to bind"), "{err}");
    }
}
