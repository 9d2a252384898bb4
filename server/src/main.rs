use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};

use kibitzer_server::analyzer::Analyzer;
use kibitzer_server::config::Config;
use kibitzer_server::notifier::Notifier;
use kibitzer_server::persistence::{Database, Stores};
use kibitzer_server::supervisor::Supervisor;
use kibitzer_server::ws;
use lichess::CatalogClient;

#[derive(Parser, Debug)]
#[command(name = "kibitzer-server", about = "Live chess broadcast analysis service")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "kibitzer.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;
    tracing::info!(config = %args.config.display(), "Starting kibitzer server");

    let database = Database::open(&config.db_path).await?;
    let stores = Stores::new(database.pool());
    let notifier = Arc::new(Notifier::new());
    let catalog = CatalogClient::new(config.lichess_url.clone());
    let supervisor = Arc::new(Supervisor::new(
        stores.clone(),
        catalog.clone(),
        notifier.clone(),
        &config.static_dir,
    ));

    if config.analyzers.is_empty() {
        tracing::warn!("No analyzers configured; serving persisted data only");
    }
    for (slot, analyzer_config) in config.analyzers.iter().cloned().enumerate() {
        let analyzer = Analyzer::new(
            slot,
            analyzer_config,
            stores.clone(),
            notifier.clone(),
            catalog.clone(),
            supervisor.clone(),
        );
        tokio::spawn(async move {
            // Only an engine startup failure ends an analyzer; its slot
            // then stays empty until the process restarts.
            if let Err(e) = analyzer.run().await {
                tracing::error!(slot, error = %e, "Analyzer exited");
            }
        });
    }
    tokio::spawn(supervisor.clone().run_status_loop());

    let app = ws::router(supervisor, &config.static_dir);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Server listening");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, shutting down");
        }
    }

    tracing::info!("Server shut down");
    Ok(())
}
