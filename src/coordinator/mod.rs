//! Session coordinator: glue between clients, the rules engine and the
//! replication store.
//!
//! One task owns the [`RulesEngine`] and is the only place it is mutated.
//! Connection tasks talk to it through a bounded command queue; replicated
//! events arrive on a [`Subscription`]. The merge rule is asymmetric:
//!
//! - local intents use the engine's primary API and, once accepted, are
//!   persisted and published;
//! - replicated events use the version-guarded replay API and are never
//!   published again, which keeps two servers from echoing each other
//!   forever.
//!
//! Every accepted change, local or replayed, is broadcast to all local
//! sessions.

mod handle;
mod session;

pub use handle::{Command, CoordinatorHandle, CoordinatorStopped, SessionLink};
pub use session::{OUTBOX_CAPACITY, SessionId, SessionRegistry};

use crate::protocol::{ClientMessage, ServerMessage};
use crate::replication::{ReplicationStore, Subscription, SyncEvent, SyncMessage};
use derive_getters::Getters;
use derive_new::new;
use duplex_tictactoe::{GameSnapshot, Mark, Player, Replay, RulesEngine, RulesError, ServerId};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Lifecycle of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum CoordinatorPhase {
    /// Constructed, nothing loaded.
    Uninitialized,
    /// Loading or creating the starting state.
    Hydrating,
    /// Serving clients and replicated events.
    Ready,
}

/// Startup options for a coordinator.
#[derive(Debug, Clone, Getters, new)]
pub struct CoordinatorConfig {
    /// This server's tag.
    server_id: ServerId,
    /// Discard any persisted state and start with a fresh reset.
    force_reset: bool,
    /// Capacity of the command queue.
    queue_capacity: usize,
}

/// Owner of this process's game.
pub struct SessionCoordinator {
    server_id: ServerId,
    engine: RulesEngine,
    store: ReplicationStore,
    sessions: SessionRegistry,
    phase: CoordinatorPhase,
    inbox: mpsc::Receiver<Command>,
}

impl SessionCoordinator {
    /// Subscribes, hydrates and spawns the coordinator task.
    ///
    /// Returns once the coordinator is `Ready`.
    #[instrument(skip(store), fields(server_id = %config.server_id))]
    pub async fn start(
        config: CoordinatorConfig,
        store: ReplicationStore,
    ) -> (CoordinatorHandle, JoinHandle<()>) {
        let (tx, inbox) = mpsc::channel(config.queue_capacity.max(1));
        let mut coordinator = Self {
            server_id: config.server_id.clone(),
            engine: RulesEngine::new(),
            store,
            sessions: SessionRegistry::new(),
            phase: CoordinatorPhase::Uninitialized,
            inbox,
        };

        // Subscribe before hydrating so nothing published meanwhile is lost.
        let subscription = coordinator.store.subscribe().await;
        let reconnections = coordinator.store.reconnections();
        coordinator.hydrate(config.force_reset).await;

        let task = tokio::spawn(coordinator.run(subscription, reconnections));
        (CoordinatorHandle::new(tx), task)
    }

    #[instrument(skip(self), fields(server_id = %self.server_id))]
    async fn hydrate(&mut self, force_reset: bool) {
        self.enter(CoordinatorPhase::Hydrating);
        let stored = self.store.load_snapshot().await;
        let base_version = stored.as_ref().map_or(0, |s| *s.version());

        match stored {
            Some(snapshot) if !force_reset => match RulesEngine::from_snapshot(snapshot) {
                Ok(engine) => {
                    self.engine = engine;
                    self.release_orphaned_seats().await;
                }
                Err(violations) => {
                    warn!(?violations, "Persisted snapshot is inconsistent, starting fresh");
                    self.start_fresh(base_version).await;
                }
            },
            _ => self.start_fresh(base_version).await,
        }

        self.enter(CoordinatorPhase::Ready);
        info!(
            version = self.engine.version(),
            status = ?self.engine.state().status(),
            "Coordinator ready"
        );
    }

    /// Resets and announces a new game, numbered after `base_version` so
    /// peers holding the old state accept it.
    async fn start_fresh(&mut self, base_version: u64) {
        if let Ok(engine) = RulesEngine::from_snapshot(GameSnapshot::fresh(base_version)) {
            self.engine = engine;
        }
        let snapshot = self.engine.reset();
        self.commit(SyncEvent::Reset {
            version: *snapshot.version(),
        })
        .await;
    }

    /// Seats whose home is this server belonged to connections that died
    /// with the previous process.
    async fn release_orphaned_seats(&mut self) {
        let orphaned: Vec<Mark> = self
            .engine
            .state()
            .seats()
            .players()
            .filter(|p| p.home == self.server_id)
            .map(|p| p.mark)
            .collect();

        for mark in orphaned {
            info!(?mark, "Releasing seat held before restart");
            if let Ok(snapshot) = self.engine.leave(mark) {
                self.commit(SyncEvent::LeftPlayer {
                    mark,
                    version: *snapshot.version(),
                })
                .await;
            }
        }
    }

    fn enter(&mut self, phase: CoordinatorPhase) {
        debug!(from = %self.phase, to = %phase, "Coordinator phase change");
        self.phase = phase;
    }

    async fn run(
        mut self,
        mut subscription: Subscription,
        mut reconnections: watch::Receiver<u64>,
    ) {
        loop {
            tokio::select! {
                command = self.inbox.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        info!("All handles dropped, coordinator stopping");
                        break;
                    }
                },
                Some(message) = subscription.next() => self.handle_remote(message).await,
                Ok(()) = reconnections.changed() => self.resync().await,
            }
            self.drop_slow_sessions().await;
        }
    }

    /// Closes sessions whose outbox filled up. Closing drops the outbox, which
    /// ends the connection's writer and then the connection.
    async fn drop_slow_sessions(&mut self) {
        loop {
            let overflowed = self.sessions.take_overflowed();
            if overflowed.is_empty() {
                break;
            }
            for session in overflowed {
                self.disconnect(session).await;
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => self.connect(reply),
            Command::Intent { session, message } => self.handle_intent(session, message).await,
            Command::Disconnect { session } => self.disconnect(session).await,
            Command::Notify { session, message } => self.sessions.send(session, message),
            Command::Snapshot { reply } => {
                if reply.send(self.engine.snapshot()).is_err() {
                    debug!("Snapshot reply channel closed (caller dropped)");
                }
            }
        }
    }

    fn connect(&mut self, reply: oneshot::Sender<SessionLink>) {
        let (tx, outbox) = mpsc::channel(OUTBOX_CAPACITY);
        let id = self.sessions.open(tx);
        self.sessions.send(id, ServerMessage::update(self.engine.state()));

        if reply.send(SessionLink { id, outbox }).is_err() {
            debug!(session_id = id, "Connection gone before registration completed");
            self.sessions.close(id);
        }
    }

    #[instrument(skip(self), fields(server_id = %self.server_id))]
    async fn handle_intent(&mut self, session: SessionId, message: ClientMessage) {
        if !self.sessions.contains(session) {
            debug!(session_id = session, "Intent from closed session ignored");
            return;
        }
        match message {
            ClientMessage::Join => self.local_join(session).await,
            ClientMessage::Move { row, col } => self.local_move(session, row, col).await,
            ClientMessage::Reset => self.local_reset().await,
        }
    }

    async fn local_join(&mut self, session: SessionId) {
        if let Some(mark) = self.sessions.mark(session) {
            let message = ServerMessage::error(format!("Already joined as {}", mark));
            self.sessions.send(session, message);
            return;
        }

        match self.engine.join(self.server_id.clone()) {
            Ok(mark) => {
                self.sessions.assign(session, mark);
                self.sessions.send(session, ServerMessage::Joined { player_id: mark });
                self.commit(SyncEvent::Joined {
                    player: Player::new(mark, self.server_id.clone()),
                    version: self.engine.version(),
                })
                .await;
            }
            Err(e) => self.reject(session, e),
        }
    }

    async fn local_move(&mut self, session: SessionId, row: i64, col: i64) {
        let Some(mark) = self.sessions.mark(session) else {
            self.sessions.send(session, ServerMessage::error("Not a player"));
            return;
        };
        let (Ok(row), Ok(col)) = (usize::try_from(row), usize::try_from(col)) else {
            self.reject(session, RulesError::OutOfBounds);
            return;
        };

        match self.engine.apply_move(row, col, mark) {
            Ok(snapshot) => {
                self.commit(SyncEvent::MoveApplied {
                    row,
                    col,
                    mark,
                    version: *snapshot.version(),
                })
                .await;
            }
            Err(e) => self.reject(session, e),
        }
    }

    async fn local_reset(&mut self) {
        let snapshot = self.engine.reset();
        self.sessions.retain_marks(|_| false);
        self.commit(SyncEvent::Reset {
            version: *snapshot.version(),
        })
        .await;
    }

    #[instrument(skip(self), fields(server_id = %self.server_id))]
    async fn disconnect(&mut self, session: SessionId) {
        let Some(Some(mark)) = self.sessions.close(session) else {
            return;
        };
        match self.engine.leave(mark) {
            Ok(snapshot) => {
                self.commit(SyncEvent::LeftPlayer {
                    mark,
                    version: *snapshot.version(),
                })
                .await;
            }
            Err(e) => debug!(?mark, error = %e, "Seat already released"),
        }
    }

    fn reject(&mut self, session: SessionId, error: RulesError) {
        debug!(session_id = session, %error, "Intent rejected");
        self.sessions.send(session, ServerMessage::error(error.to_string()));
    }

    /// Persists, publishes and broadcasts a locally accepted mutation.
    async fn commit(&mut self, event: SyncEvent) {
        let snapshot = self.engine.snapshot();
        self.store.save_snapshot(&snapshot).await;
        self.store
            .publish(&SyncMessage::new(self.server_id.clone(), event))
            .await;
        self.sessions.broadcast(&ServerMessage::for_snapshot(&snapshot));
    }

    #[instrument(skip(self, message), fields(server_id = %self.server_id, origin = %message.origin, channel = %message.event.channel()))]
    async fn handle_remote(&mut self, message: SyncMessage) {
        if message.origin == self.server_id {
            debug!("Skipping own event");
            return;
        }

        let offered_older_sync = matches!(
            &message.event,
            SyncEvent::Sync { snapshot } if *snapshot.version() < self.engine.version()
        );

        let replay = match message.event {
            SyncEvent::Joined { player, version } => self.engine.apply_remote_join(player, version),
            SyncEvent::MoveApplied {
                row,
                col,
                mark,
                version,
            } => self.engine.apply_remote_move(row, col, mark, version),
            SyncEvent::Reset { version } => Ok(self.engine.apply_remote_reset(version)),
            SyncEvent::LeftPlayer { mark, version } => {
                self.engine.apply_remote_leave(mark, version)
            }
            SyncEvent::Sync { snapshot } => self.engine.adopt(snapshot),
        };

        match replay {
            Ok(Replay::Applied(snapshot)) => {
                info!(version = *snapshot.version(), "Replayed remote event");
                // Replays are persisted but never published again.
                self.store.save_snapshot(&snapshot).await;
                self.announce_replaced(&snapshot);
            }
            Ok(Replay::Stale(snapshot)) if offered_older_sync => {
                info!(
                    local_version = *snapshot.version(),
                    "Peer resynced with older state, answering"
                );
                self.publish_sync(snapshot).await;
            }
            Ok(Replay::Stale(snapshot)) => {
                debug!(local_version = *snapshot.version(), "Stale remote event ignored");
            }
            Err(e) => warn!(error = %e, "Remote event rejected by rules"),
        }
    }

    /// Broadcasts state that arrived from elsewhere, first clearing marks
    /// whose seat no longer belongs to this server.
    fn announce_replaced(&mut self, snapshot: &GameSnapshot) {
        let server_id = self.server_id.clone();
        self.sessions.retain_marks(|mark| {
            snapshot
                .seats()
                .get(mark)
                .is_some_and(|p| p.home == server_id)
        });
        self.sessions.broadcast(&ServerMessage::for_snapshot(snapshot));
    }

    /// Reconciles with the store after it comes back.
    ///
    /// The persisted snapshot is what the connected side did meanwhile; it
    /// wins when it is at least as new as ours. Otherwise our state is newer
    /// and is persisted and announced.
    #[instrument(skip(self), fields(server_id = %self.server_id))]
    async fn resync(&mut self) {
        if let Some(stored) = self.store.load_snapshot().await
            && *stored.version() >= self.engine.version()
            && stored != *self.engine.state()
        {
            match RulesEngine::from_snapshot(stored) {
                Ok(engine) => {
                    self.engine = engine;
                    let snapshot = self.engine.snapshot();
                    info!(version = *snapshot.version(), "Store reconnected, adopted stored state");
                    self.announce_replaced(&snapshot);
                }
                Err(violations) => {
                    warn!(?violations, "Stored snapshot is inconsistent, keeping local state");
                }
            }
        }

        let snapshot = self.engine.snapshot();
        info!(version = *snapshot.version(), "Store reconnected, publishing resync");
        self.store.save_snapshot(&snapshot).await;
        self.publish_sync(snapshot).await;
    }

    async fn publish_sync(&self, snapshot: GameSnapshot) {
        self.store
            .publish(&SyncMessage::new(
                self.server_id.clone(),
                SyncEvent::Sync { snapshot },
            ))
            .await;
    }
}
