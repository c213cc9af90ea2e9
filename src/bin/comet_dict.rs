//! comet-dict server binary.

use clap::Parser;
use comet_dict::{Config, Hooks, Server};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "comet-dict")]
#[command(about = "Long-poll push channel and replicated key-value store for browser clients")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8000")]
    listen: SocketAddr,

    /// Directory holding one store file per domain
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Optional JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds of heartbeat silence before an implicit disconnect
    #[arg(long)]
    client_timeout: Option<u64>,

    /// Seconds a receive blocks before returning empty
    #[arg(long)]
    receive_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("comet_dict=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match (&args.config, &args.db_path) {
        (Some(path), _) => Config::load(path).await?,
        (None, Some(db_path)) => Config::new(db_path),
        (None, None) => anyhow::bail!("either --config or --db-path is required"),
    };
    if let Some(db_path) = args.db_path {
        config.db_path = db_path;
    }
    if let Some(secs) = args.client_timeout {
        config.client_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.receive_timeout {
        config.receive_timeout = Duration::from_secs(secs);
    }

    let server = Server::new(&config, Hooks::new())?;
    let app = server.router(&config);

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    tracing::info!(
        "listening on {} ({} and {})",
        args.listen,
        config.comet_prefix,
        config.store_prefix
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    server.shutdown().await;
    Ok(())
}
