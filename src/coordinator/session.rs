//! Locally connected client sessions.

use crate::protocol::ServerMessage;
use duplex_tictactoe::Mark;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, instrument, warn};

/// Identifier of one client connection within this process.
pub type SessionId = u64;

/// Messages a session may have queued before it is dropped as too slow.
pub const OUTBOX_CAPACITY: usize = 64;

/// One live connection and the mark it holds, if seated.
#[derive(Debug)]
struct ClientSession {
    mark: Option<Mark>,
    outbox: mpsc::Sender<ServerMessage>,
}

/// Connections owned by the coordinator task.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<SessionId, ClientSession>,
    next_id: SessionId,
    overflowed: Vec<SessionId>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection that will receive messages through `outbox`.
    #[instrument(skip(self, outbox))]
    pub fn open(&mut self, outbox: mpsc::Sender<ServerMessage>) -> SessionId {
        let id = self.next_id;
        self.next_id += 1;
        self.sessions.insert(id, ClientSession { mark: None, outbox });
        info!(session_id = id, connected = self.sessions.len(), "Session opened");
        id
    }

    /// Removes a connection, returning the mark it held.
    ///
    /// `None` if the session was unknown; `Some(None)` if it was a spectator.
    #[instrument(skip(self))]
    pub fn close(&mut self, id: SessionId) -> Option<Option<Mark>> {
        let session = self.sessions.remove(&id)?;
        info!(session_id = id, mark = ?session.mark, "Session closed");
        Some(session.mark)
    }

    /// True if `id` is connected.
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Mark held by `id`.
    pub fn mark(&self, id: SessionId) -> Option<Mark> {
        self.sessions.get(&id).and_then(|s| s.mark)
    }

    /// Records that `id` was seated as `mark`.
    #[instrument(skip(self))]
    pub fn assign(&mut self, id: SessionId, mark: Mark) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.mark = Some(mark);
        }
    }

    /// Drops every mark for which `still_seated` is false.
    #[instrument(skip(self, still_seated))]
    pub fn retain_marks(&mut self, still_seated: impl Fn(Mark) -> bool) {
        for (id, session) in &mut self.sessions {
            if let Some(mark) = session.mark
                && !still_seated(mark)
            {
                debug!(session_id = *id, ?mark, "Seat no longer held, clearing mark");
                session.mark = None;
            }
        }
    }

    /// Sends to one session.
    pub fn send(&mut self, id: SessionId, message: ServerMessage) {
        if let Some(session) = self.sessions.get(&id)
            && !Self::offer(id, &session.outbox, message)
        {
            self.overflowed.push(id);
        }
    }

    /// Sends `messages` in order to every session.
    pub fn broadcast(&mut self, messages: &[ServerMessage]) {
        for (id, session) in &self.sessions {
            for message in messages {
                if !Self::offer(*id, &session.outbox, message.clone()) {
                    self.overflowed.push(*id);
                    break;
                }
            }
        }
    }

    /// Sessions whose outbox filled up since the last call. The caller
    /// closes them.
    pub fn take_overflowed(&mut self) -> Vec<SessionId> {
        let mut overflowed = std::mem::take(&mut self.overflowed);
        overflowed.sort_unstable();
        overflowed.dedup();
        overflowed
    }

    /// False when the outbox is full.
    fn offer(id: SessionId, outbox: &mpsc::Sender<ServerMessage>, message: ServerMessage) -> bool {
        match outbox.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(session_id = id, "Outbox full, dropping slow session");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(session_id = id, "Outbox closed");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_reports_mark() {
        let mut registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(OUTBOX_CAPACITY);
        let seated = registry.open(tx.clone());
        let spectator = registry.open(tx);
        registry.assign(seated, Mark::O);

        assert_eq!(registry.close(seated), Some(Some(Mark::O)));
        assert_eq!(registry.close(spectator), Some(None));
        assert_eq!(registry.close(spectator), None);
        assert!(!registry.contains(seated));
    }

    #[test]
    fn test_retain_marks_clears_revoked() {
        let mut registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(OUTBOX_CAPACITY);
        let x = registry.open(tx.clone());
        let o = registry.open(tx);
        registry.assign(x, Mark::X);
        registry.assign(o, Mark::O);

        registry.retain_marks(|mark| mark == Mark::X);
        assert_eq!(registry.mark(x), Some(Mark::X));
        assert_eq!(registry.mark(o), None);
    }

    #[test]
    fn test_broadcast_reaches_everyone_in_order() {
        let mut registry = SessionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(OUTBOX_CAPACITY);
        let (tx_b, mut rx_b) = mpsc::channel(OUTBOX_CAPACITY);
        registry.open(tx_a);
        registry.open(tx_b);

        registry.broadcast(&[ServerMessage::Draw, ServerMessage::error("x")]);
        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(rx.try_recv().unwrap(), ServerMessage::Draw);
            assert_eq!(rx.try_recv().unwrap(), ServerMessage::error("x"));
        }
    }

    #[test]
    fn test_full_outbox_is_reported_once() {
        let mut registry = SessionRegistry::new();
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(OUTBOX_CAPACITY);
        let slow = registry.open(slow_tx);
        let fast = registry.open(fast_tx);

        registry.broadcast(&[ServerMessage::Draw, ServerMessage::Draw]);
        registry.send(slow, ServerMessage::error("x"));

        assert_eq!(registry.take_overflowed(), vec![slow]);
        assert!(registry.take_overflowed().is_empty());
        assert_eq!(fast_rx.try_recv().unwrap(), ServerMessage::Draw);
        assert!(registry.contains(fast));
    }
}
