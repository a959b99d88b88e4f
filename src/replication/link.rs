//! Backend seam for the shared pub/sub + key-value store.

use super::StoreError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Stream of `(channel name, payload)` pairs from a subscription.
///
/// The stream ends when the backend loses its connection.
pub type PayloadStream = BoxStream<'static, (String, String)>;

/// A live connection to the store.
#[async_trait]
pub trait StoreLink: Send + Sync {
    /// Publishes `payload` on `channel`.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError>;

    /// Subscribes to every channel in `channels`.
    async fn subscribe(&self, channels: &[String]) -> Result<PayloadStream, StoreError>;

    /// Stores `value` under `key`, overwriting.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Reads the value under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// Opens links to the store; called again by the reconnect loop.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Attempts one connection.
    async fn connect(&self) -> Result<Arc<dyn StoreLink>, StoreError>;
}
