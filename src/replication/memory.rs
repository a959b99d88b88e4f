//! In-process store backend.
//!
//! A [`MemoryHub`] is a shared bus plus key-value map. Each server gets its
//! own [`MemoryEndpoint`] with an independent reachability switch, so a
//! test can partition one server from the store while its peer stays
//! connected. A lone endpoint also lets a server run self-contained.

use super::link::{PayloadStream, StoreConnector, StoreLink};
use super::StoreError;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, instrument, warn};

const BUS_CAPACITY: usize = 256;

/// Shared pub/sub bus and key-value map.
#[derive(Debug, Clone)]
pub struct MemoryHub {
    bus: broadcast::Sender<(String, String)>,
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryHub {
    /// Creates an empty hub.
    #[instrument]
    pub fn new() -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            bus,
            values: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// A reachable endpoint onto this hub.
    pub fn endpoint(&self) -> MemoryEndpoint {
        MemoryEndpoint::new(self.clone(), true)
    }

    /// An endpoint that starts unreachable.
    pub fn unreachable_endpoint(&self) -> MemoryEndpoint {
        MemoryEndpoint::new(self.clone(), false)
    }

    /// Reads a stored value directly.
    pub async fn value(&self, key: &str) -> Option<String> {
        self.values.lock().await.get(key).cloned()
    }

    /// Writes a stored value directly.
    pub async fn put(&self, key: &str, value: &str) {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
    }

    /// Publishes a raw payload, bypassing any endpoint.
    pub fn inject(&self, channel: &str, payload: &str) {
        if self
            .bus
            .send((channel.to_string(), payload.to_string()))
            .is_err()
        {
            debug!(channel, "No subscribers for injected payload");
        }
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One server's connection point onto a [`MemoryHub`].
#[derive(Debug, Clone)]
pub struct MemoryEndpoint {
    hub: MemoryHub,
    online: Arc<watch::Sender<bool>>,
}

impl MemoryEndpoint {
    fn new(hub: MemoryHub, online: bool) -> Self {
        let (online, _) = watch::channel(online);
        Self {
            hub,
            online: Arc::new(online),
        }
    }

    /// Makes the store reachable or unreachable from this endpoint.
    ///
    /// Going offline ends open subscriptions and fails every operation.
    #[instrument(skip(self))]
    pub fn set_online(&self, online: bool) {
        self.online.send_replace(online);
    }

    /// Current reachability.
    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// The hub behind this endpoint.
    pub fn hub(&self) -> &MemoryHub {
        &self.hub
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.is_online() {
            Ok(())
        } else {
            Err(StoreError::unavailable("memory endpoint offline"))
        }
    }
}

#[async_trait]
impl StoreConnector for MemoryEndpoint {
    async fn connect(&self) -> Result<Arc<dyn StoreLink>, StoreError> {
        self.ensure_online()?;
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl StoreLink for MemoryEndpoint {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        self.ensure_online()?;
        self.hub.inject(channel, payload);
        Ok(())
    }

    async fn subscribe(&self, channels: &[String]) -> Result<PayloadStream, StoreError> {
        self.ensure_online()?;
        let wanted: HashSet<String> = channels.iter().cloned().collect();
        let rx = self.hub.bus.subscribe();
        let online = self.online.subscribe();

        let stream = futures::stream::unfold(
            (rx, online, wanted),
            |(mut rx, mut online, wanted)| async move {
                loop {
                    if !*online.borrow_and_update() {
                        return None;
                    }
                    tokio::select! {
                        received = rx.recv() => match received {
                            Ok((channel, payload)) => {
                                if wanted.contains(&channel) {
                                    return Some(((channel, payload), (rx, online, wanted)));
                                }
                            }
                            Err(RecvError::Lagged(skipped)) => {
                                warn!(skipped, "Memory subscriber lagged");
                            }
                            Err(RecvError::Closed) => return None,
                        },
                        changed = online.changed() => {
                            if changed.is_err() {
                                return None;
                            }
                        }
                    }
                }
            },
        );
        Ok(stream.boxed())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.ensure_online()?;
        self.hub.put(key, value).await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.ensure_online()?;
        Ok(self.hub.value(key).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_sees_only_wanted_channels() {
        let hub = MemoryHub::new();
        let endpoint = hub.endpoint();
        let mut stream = endpoint.subscribe(&["a:move".to_string()]).await.unwrap();

        endpoint.publish("a:join", "ignored").await.unwrap();
        endpoint.publish("a:move", "kept").await.unwrap();

        let (channel, payload) = stream.next().await.unwrap();
        assert_eq!(channel, "a:move");
        assert_eq!(payload, "kept");
    }

    #[tokio::test]
    async fn test_going_offline_ends_stream_and_fails_calls() {
        let hub = MemoryHub::new();
        let endpoint = hub.endpoint();
        let mut stream = endpoint.subscribe(&["a:move".to_string()]).await.unwrap();

        endpoint.set_online(false);
        assert!(stream.next().await.is_none());
        assert!(endpoint.publish("a:move", "x").await.is_err());
        assert!(endpoint.get("k").await.is_err());
        assert!(endpoint.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_endpoints_share_values() {
        let hub = MemoryHub::new();
        hub.endpoint().set("k", "v").await.unwrap();
        assert_eq!(hub.endpoint().get("k").await.unwrap().as_deref(), Some("v"));
    }
}
