//! Duplex Games library - one tic-tac-toe board served by two processes
//!
//! Each server process owns its own copy of the game and keeps it in step
//! with its peer through a shared pub/sub + key-value store.
//!
//! # Architecture
//!
//! - **Rules**: the [`duplex_tictactoe`] crate, pure and versioned
//! - **Replication**: [`ReplicationStore`] publishes accepted changes,
//!   persists snapshots and survives store outages
//! - **Coordinator**: [`SessionCoordinator`] owns the engine and merges
//!   local intents with replicated events
//! - **Transport**: WebSocket endpoint speaking the JSON [`protocol`]
//!
//! # Example
//!
//! ```no_run
//! use duplex_games::{MemoryHub, ReplicationStore, ServerConfig, SessionCoordinator};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServerConfig::default();
//! let hub = MemoryHub::new();
//! let store = ReplicationStore::connect(
//!     Arc::new(hub.endpoint()),
//!     config.store().replication(),
//! )
//! .await;
//! let (handle, _task) = SessionCoordinator::start(config.coordinator(), store).await;
//! let listener = tokio::net::TcpListener::bind(config.bind_addr()?).await?;
//! duplex_games::transport::serve(listener, handle).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod coordinator;
pub mod protocol;
pub mod replication;
pub mod transport;

// Crate-level exports - Configuration
pub use config::{ConfigError, MEMORY_STORE, STORE_URL_ENV, ServerConfig, StoreConfig};

// Crate-level exports - Coordinator
pub use coordinator::{
    Command, CoordinatorConfig, CoordinatorHandle, CoordinatorPhase, CoordinatorStopped,
    OUTBOX_CAPACITY, SessionCoordinator, SessionId, SessionLink, SessionRegistry,
};

// Crate-level exports - Protocol
pub use protocol::{ClientMessage, ServerMessage, WireStatus};

// Crate-level exports - Replication
pub use replication::{
    Delivery, MemoryEndpoint, MemoryHub, RedisConnector, ReplicationSettings, ReplicationStore,
    StoreConnector, StoreError, StoreErrorKind, Subscription, SyncEvent, SyncMessage,
};

// Crate-level exports - Game types
pub use duplex_tictactoe::{
    GameSnapshot, GameStatus, Mark, Player, RulesEngine, RulesError, ServerId,
};
