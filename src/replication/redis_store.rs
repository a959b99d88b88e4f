//! Redis store backend.

use super::link::{PayloadStream, StoreConnector, StoreLink};
use super::StoreError;
use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Opens Redis connections from a URL such as `redis://localhost:6379`.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    client: redis::Client,
}

impl RedisConnector {
    /// Validates `url` without connecting.
    #[instrument]
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StoreConnector for RedisConnector {
    #[instrument(skip(self))]
    async fn connect(&self) -> Result<Arc<dyn StoreLink>, StoreError> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut connection).await?;
        info!("Connected to Redis");
        Ok(Arc::new(RedisLink {
            client: self.client.clone(),
            connection,
        }))
    }
}

/// A live Redis connection.
///
/// Commands share one multiplexed connection; each subscription opens its
/// own pub/sub connection, as Redis requires.
#[derive(Clone)]
pub struct RedisLink {
    client: redis::Client,
    connection: MultiplexedConnection,
}

#[async_trait]
impl StoreLink for RedisLink {
    #[instrument(skip(self, payload))]
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let receivers: i64 = connection.publish(channel, payload).await?;
        debug!(receivers, "Published");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn subscribe(&self, channels: &[String]) -> Result<PayloadStream, StoreError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        for channel in channels {
            pubsub.subscribe(channel).await?;
        }
        info!(count = channels.len(), "Subscribed to Redis channels");

        let stream = pubsub.into_on_message().filter_map(|message| async move {
            let channel = message.get_channel_name().to_string();
            match message.get_payload::<String>() {
                Ok(payload) => Some((channel, payload)),
                Err(e) => {
                    warn!(channel, error = %e, "Dropping non-text payload");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let () = connection.set(key, value).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut connection = self.connection.clone();
        Ok(connection.get(key).await?)
    }
}
