//! emufetch HTTP service

mod error;
mod server;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use clap::Parser;
use emufetch_core::{EmufetchCore, SettingsStore};
use server::ApiServer;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "emufetch-server", version, about = "HTTP service for emufetch acquisitions")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "EMUFETCH_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Origins allowed to call the service (comma-separated)
    #[arg(
        long,
        env = "EMUFETCH_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_values = ["https://file-downloader-tau.vercel.app", "http://localhost:4200"]
    )]
    allowed_origins: Vec<String>,

    /// Settings file (defaults to the platform config directory)
    #[arg(long, env = "EMUFETCH_SETTINGS")]
    settings: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let store = SettingsStore::new(args.settings.unwrap_or_else(SettingsStore::default_path));
    let settings = store
        .load()
        .await
        .with_context(|| format!("Failed to load settings from {}", store.path().display()))?;
    tracing::info!("Using settings from {}", store.path().display());

    let origins = args
        .allowed_origins
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .map(|o| HeaderValue::from_str(o).with_context(|| format!("Invalid origin: {}", o)))
        .collect::<Result<Vec<_>>>()?;

    let core = EmufetchCore::new(settings).context("Failed to initialize core")?;
    let server = ApiServer::new(core, args.bind, origins);

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            let _ = shutdown.send(());
        }
    });

    server.start().await
}
