//! Command-line interface for duplex_games.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Duplex Games - one tic-tac-toe board shared by two replicated servers
#[derive(Parser, Debug)]
#[command(name = "duplex_games")]
#[command(about = "Replicated tic-tac-toe game server", long_about = None)]
#[command(version)]
pub struct Cli {
    /// TOML configuration file; flags override its values
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a game server
    Serve {
        /// Tag for events this server publishes (must differ between servers)
        #[arg(long)]
        server_id: Option<String>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,

        /// Store URL (`redis://...` or `memory`)
        #[arg(long)]
        store_url: Option<String>,

        /// Discard the persisted game and start fresh
        #[arg(long)]
        force_reset: bool,
    },

    /// Print the persisted game state
    Snapshot {
        /// Store URL (`redis://...`)
        #[arg(long)]
        store_url: Option<String>,
    },
}
