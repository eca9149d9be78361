//! gangwayd, the gangway deployment daemon.

use anyhow::{Context, Result};
use clap::Parser;
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use gangway_core::config::ServerConfig;
use gangway_server::{create_router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// gangway deployment daemon
#[derive(Parser, Debug)]
#[command(name = "gangwayd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the server configuration file
    #[arg(
        short,
        long,
        env = "GANGWAY_CONFIG",
        default_value = "/etc/gangway/server.yaml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config: ServerConfig = Figment::new()
        .merge(Yaml::file(&args.config))
        .merge(Env::prefixed("GANGWAY_"))
        .extract()
        .with_context(|| format!("failed to load configuration from {}", args.config))?;
    config.validate().context("invalid configuration")?;

    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("creating log dir {}", config.log_dir.display()))?;
    let log_file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(config.log_dir.join("gangwayd.log"))
        .context("opening log file")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(log_file)),
        )
        .init();

    tracing::info!("gangwayd v{}", env!("CARGO_PKG_VERSION"));

    let addr = config.listen_addr().context("invalid listen address")?;
    let app = create_router(AppState::new(config));

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    // ConnectInfo feeds the rate limiters their per-address keys.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
