//! Client-side handle onto a running coordinator.

use super::SessionId;
use crate::protocol::{ClientMessage, ServerMessage};
use derive_more::{Display, Error};
use duplex_tictactoe::GameSnapshot;
use tokio::sync::{mpsc, oneshot};
use tracing::instrument;

/// Work queued for the coordinator task.
#[derive(Debug)]
pub enum Command {
    /// Register a new connection.
    Connect {
        /// Receives the new session's link.
        reply: oneshot::Sender<SessionLink>,
    },
    /// A client intent.
    Intent {
        /// Originating session.
        session: SessionId,
        /// The intent.
        message: ClientMessage,
    },
    /// A connection closed.
    Disconnect {
        /// Closed session.
        session: SessionId,
    },
    /// A message for one session that did not come from the game, e.g. a
    /// reply to an unparseable frame.
    Notify {
        /// Addressed session.
        session: SessionId,
        /// The message.
        message: ServerMessage,
    },
    /// Read the current state.
    Snapshot {
        /// Receives the snapshot.
        reply: oneshot::Sender<GameSnapshot>,
    },
}

/// The coordinator task has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
#[display("Coordinator stopped")]
pub struct CoordinatorStopped;

/// A registered connection: its id and the messages addressed to it.
#[derive(Debug)]
pub struct SessionLink {
    /// Session id to tag intents with.
    pub id: SessionId,
    /// Messages for this session, in order. Closes when the coordinator
    /// drops the session.
    pub outbox: mpsc::Receiver<ServerMessage>,
}

/// Cloneable sender side of the coordinator queue.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    pub(super) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Registers a connection. The first message on its outbox is the
    /// current state.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<SessionLink, CoordinatorStopped> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connect { reply }).await?;
        rx.await.map_err(|_| CoordinatorStopped)
    }

    /// Queues a client intent.
    #[instrument(skip(self))]
    pub async fn submit(
        &self,
        session: SessionId,
        message: ClientMessage,
    ) -> Result<(), CoordinatorStopped> {
        self.send(Command::Intent { session, message }).await
    }

    /// Queues `message` for one session.
    #[instrument(skip(self))]
    pub async fn notify(
        &self,
        session: SessionId,
        message: ServerMessage,
    ) -> Result<(), CoordinatorStopped> {
        self.send(Command::Notify { session, message }).await
    }

    /// Reports a closed connection.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, session: SessionId) -> Result<(), CoordinatorStopped> {
        self.send(Command::Disconnect { session }).await
    }

    /// Current state.
    #[instrument(skip(self))]
    pub async fn snapshot(&self) -> Result<GameSnapshot, CoordinatorStopped> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| CoordinatorStopped)
    }

    async fn send(&self, command: Command) -> Result<(), CoordinatorStopped> {
        self.tx.send(command).await.map_err(|_| CoordinatorStopped)
    }
}
