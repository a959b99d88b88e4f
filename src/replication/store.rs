//! The replication store: the only component that talks to the shared
//! pub/sub + key-value system.
//!
//! When the store cannot be reached the component runs degraded: publishes
//! and snapshot writes are logged and dropped, snapshot reads return
//! `None`, and subscriptions simply stay silent. A background task retries
//! the connection on an exponential schedule; every successful connection
//! bumps a generation counter that subscriptions and the coordinator watch
//! to resubscribe and resynchronize.

use super::link::{PayloadStream, StoreConnector, StoreLink};
use super::{Backoff, Channel, StoreError, SyncMessage};
use duplex_tictactoe::GameSnapshot;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock, mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

const SUBSCRIPTION_BUFFER: usize = 64;

/// Naming and retry settings for a [`ReplicationStore`].
#[derive(Debug, Clone)]
pub struct ReplicationSettings {
    /// Prefix for channel names.
    pub channel_prefix: String,
    /// Key holding the persisted snapshot.
    pub snapshot_key: String,
    /// First reconnect delay.
    pub backoff_initial: Duration,
    /// Largest reconnect delay.
    pub backoff_max: Duration,
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            channel_prefix: "tic_tac_toe".to_string(),
            snapshot_key: "game_state:default".to_string(),
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
        }
    }
}

/// Whether a write reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the store.
    Sent,
    /// Dropped because the store is unavailable.
    Dropped,
}

/// Handle to the shared store. Cheap to clone.
#[derive(Clone)]
pub struct ReplicationStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    connector: Arc<dyn StoreConnector>,
    link: RwLock<Option<Arc<dyn StoreLink>>>,
    settings: ReplicationSettings,
    generation: watch::Sender<u64>,
    degraded: Notify,
}

impl std::fmt::Debug for ReplicationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationStore")
            .field("settings", &self.inner.settings)
            .field("generation", &*self.inner.generation.borrow())
            .finish()
    }
}

impl ReplicationStore {
    /// Makes one connection attempt and starts the reconnect supervisor.
    ///
    /// Never fails: an unreachable store yields a degraded instance.
    #[instrument(skip(connector))]
    pub async fn connect(
        connector: Arc<dyn StoreConnector>,
        settings: ReplicationSettings,
    ) -> Self {
        let (generation, _) = watch::channel(0);
        let store = Self {
            inner: Arc::new(StoreInner {
                connector,
                link: RwLock::new(None),
                settings,
                generation,
                degraded: Notify::new(),
            }),
        };

        match store.inner.connector.connect().await {
            Ok(link) => store.install(link).await,
            Err(e) => warn!(error = %e, "Store unavailable at startup, running local-only"),
        }

        tokio::spawn(store.clone().supervise());
        store
    }

    /// True while no connection is held.
    pub async fn is_degraded(&self) -> bool {
        self.inner.link.read().await.is_none()
    }

    /// Settings in use.
    pub fn settings(&self) -> &ReplicationSettings {
        &self.inner.settings
    }

    /// Counter bumped on every successful (re)connection.
    ///
    /// The value seen at subscription time counts as observed, so
    /// `changed()` fires only for later connections.
    pub fn reconnections(&self) -> watch::Receiver<u64> {
        let mut rx = self.inner.generation.subscribe();
        rx.borrow_and_update();
        rx
    }

    /// Publishes `message` on its event's channel.
    #[instrument(skip(self, message), fields(channel = %message.event.channel(), version = message.event.version()))]
    pub async fn publish(&self, message: &SyncMessage) -> Delivery {
        let Some(link) = self.current_link().await else {
            debug!("Degraded, dropping publish");
            return Delivery::Dropped;
        };
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to encode event");
                return Delivery::Dropped;
            }
        };
        let channel = message
            .event
            .channel()
            .name(&self.inner.settings.channel_prefix);

        match link.publish(&channel, &payload).await {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                self.degrade(&link, e).await;
                Delivery::Dropped
            }
        }
    }

    /// Persists `snapshot`, overwriting whatever is stored.
    #[instrument(skip(self, snapshot), fields(version = snapshot.version()))]
    pub async fn save_snapshot(&self, snapshot: &GameSnapshot) -> Delivery {
        let Some(link) = self.current_link().await else {
            debug!("Degraded, skipping snapshot save");
            return Delivery::Dropped;
        };
        let value = match serde_json::to_string(snapshot) {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "Failed to encode snapshot");
                return Delivery::Dropped;
            }
        };

        match link.set(&self.inner.settings.snapshot_key, &value).await {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                self.degrade(&link, e).await;
                Delivery::Dropped
            }
        }
    }

    /// Reads the persisted snapshot.
    ///
    /// `None` when degraded, when nothing is stored, or when the stored
    /// value does not parse.
    #[instrument(skip(self))]
    pub async fn load_snapshot(&self) -> Option<GameSnapshot> {
        let link = self.current_link().await?;
        let raw = match link.get(&self.inner.settings.snapshot_key).await {
            Ok(raw) => raw?,
            Err(e) => {
                self.degrade(&link, e).await;
                return None;
            }
        };

        match serde_json::from_str::<GameSnapshot>(&raw) {
            Ok(snapshot) => {
                info!(version = snapshot.version(), "Loaded persisted snapshot");
                Some(snapshot)
            }
            Err(e) => {
                warn!(error = %e, "Persisted snapshot is corrupt, ignoring it");
                None
            }
        }
    }

    /// Opens a subscription to every event channel.
    ///
    /// The subscription lives across reconnects: when the underlying stream
    /// ends it waits for the next connection and subscribes again.
    /// Malformed payloads are logged and skipped.
    #[instrument(skip(self))]
    pub async fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let generations = self.reconnections();
        let first = self.open_stream().await;
        tokio::spawn(self.clone().pump(first, generations, tx));
        Subscription { rx }
    }

    async fn current_link(&self) -> Option<Arc<dyn StoreLink>> {
        self.inner.link.read().await.clone()
    }

    async fn install(&self, link: Arc<dyn StoreLink>) {
        *self.inner.link.write().await = Some(link);
        self.inner.generation.send_modify(|g| *g += 1);
        info!(generation = *self.inner.generation.borrow(), "Store link established");
    }

    async fn degrade(&self, failed: &Arc<dyn StoreLink>, cause: StoreError) {
        let mut link = self.inner.link.write().await;
        // A newer link may already have replaced the one that failed.
        if link.as_ref().is_some_and(|current| Arc::ptr_eq(current, failed)) {
            *link = None;
            warn!(error = %cause, "Lost store connection, degrading to local-only");
            self.inner.degraded.notify_one();
        }
    }

    async fn open_stream(&self) -> Option<(Arc<dyn StoreLink>, PayloadStream)> {
        let link = self.current_link().await?;
        let channels = Channel::all_names(&self.inner.settings.channel_prefix);
        match link.subscribe(&channels).await {
            Ok(stream) => Some((link, stream)),
            Err(e) => {
                self.degrade(&link, e).await;
                None
            }
        }
    }

    async fn pump(
        self,
        mut current: Option<(Arc<dyn StoreLink>, PayloadStream)>,
        mut generations: watch::Receiver<u64>,
        tx: mpsc::Sender<SyncMessage>,
    ) {
        loop {
            if let Some((link, mut stream)) = current.take() {
                let prefix = &self.inner.settings.channel_prefix;
                while let Some((channel, payload)) = stream.next().await {
                    match SyncMessage::decode(prefix, &channel, &payload) {
                        Ok(message) => {
                            if tx.send(message).await.is_err() {
                                debug!("Subscription dropped, stopping pump");
                                return;
                            }
                        }
                        Err(e) => warn!(error = %e, "Dropping malformed event"),
                    }
                }
                self.degrade(&link, StoreError::unavailable("subscription stream ended"))
                    .await;
            }

            if generations.changed().await.is_err() {
                return;
            }
            if tx.is_closed() {
                return;
            }
            current = self.open_stream().await;
        }
    }

    async fn supervise(self) {
        let mut backoff = Backoff::new(
            self.inner.settings.backoff_initial,
            self.inner.settings.backoff_max,
        );
        loop {
            if !self.is_degraded().await {
                self.inner.degraded.notified().await;
                continue;
            }

            let delay = backoff.next_delay();
            debug!(?delay, "Waiting before reconnect attempt");
            tokio::time::sleep(delay).await;

            match self.inner.connector.connect().await {
                Ok(link) => {
                    backoff.reset();
                    self.install(link).await;
                    info!("Reconnected to store");
                }
                Err(e) => warn!(error = %e, ?delay, "Reconnect attempt failed"),
            }
        }
    }
}

/// Infinite stream of replicated events.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<SyncMessage>,
}

impl Subscription {
    /// Next event. Pends indefinitely while the store is unreachable.
    pub async fn next(&mut self) -> Option<SyncMessage> {
        self.rx.recv().await
    }
}
