//! fleetscaled — the fleet autoscaling webhook daemon.
//!
//! Loads the scaling policy, then serves `/health` and `/scale`. When a
//! TLS certificate is mounted the listener speaks HTTPS, otherwise plain
//! HTTP.
//!
//! # Usage
//!
//! ```text
//! SCALE_FACTOR=2 MAX_REPLICAS_COUNT=50 fleetscaled --port 8000
//! ```

mod tls;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fleetscale_core::PolicyConfig;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "fleetscaled", about = "Fleet autoscaling webhook")]
struct Cli {
    /// Port to listen on. A non-empty `PORT` variable takes precedence.
    #[arg(long, default_value = "8000")]
    port: u16,

    /// PEM certificate chain. HTTPS is served only if this file exists.
    #[arg(long, default_value = "/home/service/certs/tls.crt")]
    tls_cert: PathBuf,

    /// PEM private key matching `--tls-cert`.
    #[arg(long, default_value = "/home/service/certs/tls.key")]
    tls_key: PathBuf,

    /// Optional TOML policy file; environment variables take precedence.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut cli = Cli::parse();
    cli.port = resolve_port(cli.port, std::env::var("PORT").ok())?;

    let config = PolicyConfig::load(cli.config.as_deref())
        .inspect_err(|e| error!(error = %e, "invalid scaling configuration"))?;
    info!(
        scale_factor = config.scale_factor,
        upper_threshold = config.upper_threshold,
        lower_threshold = config.lower_threshold,
        min_replicas = config.min_replicas,
        max_replicas = config.max_replicas,
        fixed_override = config.fixed_override_enabled,
        capacity_per_replica = %config.capacity_per_replica,
        capacity_headroom = config.capacity_headroom,
        capacity_counter = %config.capacity_counter,
        "scaling policy loaded"
    );

    run(cli, config).await
}

async fn run(cli: Cli, config: PolicyConfig) -> anyhow::Result<()> {
    let router = fleetscale_api::build_router(Arc::new(config));
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
        }
        let _ = shutdown_tx.send(true);
    });

    let result = if tls_enabled(&cli.tls_cert) {
        let server_config = tls::load_server_config(&cli.tls_cert, &cli.tls_key)?;
        info!(port = cli.port, "starting HTTPS server");
        tls::serve(listener, server_config, router, shutdown_rx).await
    } else {
        info!(port = cli.port, "starting HTTP server");
        let mut shutdown = shutdown_rx;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .context("HTTP server failed")
    };

    if let Err(e) = &result {
        error!(error = %e, port = cli.port, "server failed to run");
    }
    info!("fleetscaled stopped");
    result
}

/// `PORT` from the environment overrides `--port` when set and non-empty.
fn resolve_port(flag: u16, env: Option<String>) -> anyhow::Result<u16> {
    match env.filter(|v| !v.is_empty()) {
        Some(v) => v
            .parse()
            .with_context(|| format!("could not parse environment PORT={v:?}")),
        None => Ok(flag),
    }
}

fn tls_enabled(cert: &Path) -> bool {
    cert.is_file()
}
