//! Duplex Games - server binary
//!
//! Runs one of the two game servers that share a board through the
//! replication store.

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Command};
use duplex_games::{ReplicationStore, ServerConfig, SessionCoordinator, transport};
use tracing::{info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,duplex_games=debug")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };

    match cli.command {
        Command::Serve {
            server_id,
            host,
            port,
            store_url,
            force_reset,
        } => {
            let mut config = config;
            if let Some(server_id) = server_id {
                config = config.with_server_id(server_id);
            }
            if let Some(host) = host {
                config = config.with_host(host);
            }
            if let Some(port) = port {
                config = config.with_port(port);
            }
            if let Some(url) = store_url {
                config = config.with_store_url(url);
            }
            if force_reset {
                config = config.with_force_reset(true);
            }
            run_server(config.with_env_fallback()).await
        }
        Command::Snapshot { store_url } => {
            let config = match store_url {
                Some(url) => config.with_store_url(url),
                None => config,
            };
            print_snapshot(config.with_env_fallback()).await
        }
    }
}

/// Run a game server until Ctrl-C.
#[instrument(skip(config), fields(server_id = %config.server_id()))]
async fn run_server(config: ServerConfig) -> Result<()> {
    let addr = config.bind_addr()?;
    let store = ReplicationStore::connect(
        config.store().connector()?,
        config.store().replication(),
    )
    .await;
    if store.is_degraded().await {
        warn!("Starting without the replication store; will keep retrying");
    }

    let (handle, coordinator) = SessionCoordinator::start(config.coordinator(), store).await;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "Server ready at ws://{}/ws", addr);

    let outcome = tokio::select! {
        result = transport::serve(listener, handle) => result.context("Server error"),
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    };

    coordinator.abort();
    outcome
}

/// Print the persisted game state.
#[instrument(skip(config))]
async fn print_snapshot(config: ServerConfig) -> Result<()> {
    if config.store().is_memory() {
        bail!("Snapshot needs a shared store URL (--store-url or DUPLEX_STORE_URL)");
    }
    let store = ReplicationStore::connect(
        config.store().connector()?,
        config.store().replication(),
    )
    .await;
    if store.is_degraded().await {
        bail!("Store unavailable");
    }

    match store.load_snapshot().await {
        Some(snapshot) => {
            println!(
                "version {}  status {:?}  players {}  next {}",
                snapshot.version(),
                snapshot.status(),
                snapshot.player_count(),
                snapshot.next_turn()
            );
            println!("{}", snapshot.board().display());
        }
        None => println!("No game persisted under {}", config.store().snapshot_key()),
    }
    Ok(())
}
