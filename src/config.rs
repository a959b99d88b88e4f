//! Server configuration.
//!
//! Values come from an optional TOML file; command-line flags override
//! individual fields afterwards.

use crate::coordinator::CoordinatorConfig;
use crate::replication::{MemoryHub, RedisConnector, ReplicationSettings, StoreConnector};
use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use duplex_tictactoe::ServerId;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Environment variable consulted when no store URL is configured.
pub const STORE_URL_ENV: &str = "DUPLEX_STORE_URL";

/// Store URL that selects the in-process store.
pub const MEMORY_STORE: &str = "memory";

/// Settings for one game server process.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[serde(default)]
#[setters(prefix = "with_")]
pub struct ServerConfig {
    /// Tag attached to every event this server publishes.
    server_id: String,
    /// Address to bind.
    host: String,
    /// Port to bind.
    port: u16,
    /// Start from an empty game even when one is persisted.
    force_reset: bool,
    /// Capacity of the coordinator's command queue.
    queue_capacity: usize,
    /// Replication store settings.
    store: StoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_id: "server-a".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8765,
            force_reset: false,
            queue_capacity: 64,
            store: StoreConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file. Missing keys take defaults.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;

        info!(server_id = %config.server_id, "Config loaded successfully");
        Ok(config)
    }

    /// Socket address built from `host` and `port`.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::new(format!("Invalid bind address: {}", e)))
    }

    /// Options for the session coordinator.
    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig::new(
            ServerId::new(self.server_id.clone()),
            self.force_reset,
            self.queue_capacity,
        )
    }

    /// Overrides the store URL.
    pub fn with_store_url(mut self, url: impl Into<String>) -> Self {
        self.store.url = Some(url.into());
        self
    }

    /// Fills the store URL from `DUPLEX_STORE_URL` when none is configured.
    #[instrument(skip(self))]
    pub fn with_env_fallback(mut self) -> Self {
        if self.store.url.is_none()
            && let Ok(url) = std::env::var(STORE_URL_ENV)
        {
            debug!(%url, "Using store URL from environment");
            self.store.url = Some(url);
        }
        self
    }
}

/// Replication store section.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `redis://...`, `memory`, or unset for the in-process store.
    url: Option<String>,
    /// Prefix for channel names.
    channel_prefix: String,
    /// Game identifier, used in the snapshot key.
    game_id: String,
    /// First reconnect delay in milliseconds.
    backoff_initial_ms: u64,
    /// Largest reconnect delay in milliseconds.
    backoff_max_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            channel_prefix: "tic_tac_toe".to_string(),
            game_id: "default".to_string(),
            backoff_initial_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

impl StoreConfig {
    /// True when the store lives inside this process.
    pub fn is_memory(&self) -> bool {
        self.url.as_deref().is_none_or(|url| url == MEMORY_STORE)
    }

    /// Key holding the persisted snapshot.
    pub fn snapshot_key(&self) -> String {
        format!("game_state:{}", self.game_id)
    }

    /// Naming and retry settings for the replication store.
    pub fn replication(&self) -> ReplicationSettings {
        ReplicationSettings {
            channel_prefix: self.channel_prefix.clone(),
            snapshot_key: self.snapshot_key(),
            backoff_initial: Duration::from_millis(self.backoff_initial_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms.max(self.backoff_initial_ms)),
        }
    }

    /// Builds the connector the URL selects.
    #[instrument(skip(self), fields(url = ?self.url))]
    pub fn connector(&self) -> Result<Arc<dyn StoreConnector>, ConfigError> {
        match self.url.as_deref() {
            Some(url) if url != MEMORY_STORE => {
                let connector = RedisConnector::open(url)
                    .map_err(|e| ConfigError::new(format!("Invalid store URL: {}", e)))?;
                Ok(Arc::new(connector))
            }
            _ => {
                info!("Using in-process store; no replication to other processes");
                Ok(Arc::new(MemoryHub::new().endpoint()))
            }
        }
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_selection() {
        let mut store = StoreConfig::default();
        assert!(store.is_memory());
        store.url = Some(MEMORY_STORE.to_string());
        assert!(store.is_memory());
        store.url = Some("redis://localhost:6379".to_string());
        assert!(!store.is_memory());
    }

    #[test]
    fn test_replication_settings_follow_game_id() {
        let store = StoreConfig {
            game_id: "lobby-7".to_string(),
            backoff_initial_ms: 100,
            backoff_max_ms: 50,
            ..StoreConfig::default()
        };
        let settings = store.replication();
        assert_eq!(settings.snapshot_key, "game_state:lobby-7");
        assert_eq!(settings.backoff_max, Duration::from_millis(100));
    }

    #[test]
    fn test_setters_override_fields() {
        let config = ServerConfig::default()
            .with_port(9000)
            .with_server_id("server-b".to_string())
            .with_store_url("redis://store:6379");
        assert_eq!(*config.port(), 9000);
        assert_eq!(config.coordinator().server_id().as_str(), "server-b");
        assert!(!config.store().is_memory());
    }
}
