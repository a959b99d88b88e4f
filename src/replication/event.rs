//! Replicated events and their wire envelope.

use super::{Channel, StoreError};
use derive_new::new;
use duplex_tictactoe::{GameSnapshot, Mark, Player, ServerId};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// A mutation one server accepted and its peers should replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A player took a seat.
    Joined {
        /// The seated player.
        player: Player,
        /// Version after the join.
        version: u64,
    },
    /// A move was placed.
    MoveApplied {
        /// Board row.
        row: usize,
        /// Board column.
        col: usize,
        /// Mark placed.
        mark: Mark,
        /// Version after the move.
        version: u64,
    },
    /// The game was reset.
    Reset {
        /// Version after the reset.
        version: u64,
    },
    /// A player gave up a seat.
    LeftPlayer {
        /// Mark released.
        mark: Mark,
        /// Version after the release.
        version: u64,
    },
    /// Full state, published after reconnecting to the store.
    Sync {
        /// The sender's current state.
        snapshot: GameSnapshot,
    },
}

impl SyncEvent {
    /// Channel this event travels on.
    pub fn channel(&self) -> Channel {
        match self {
            SyncEvent::Joined { .. } => Channel::Join,
            SyncEvent::MoveApplied { .. } => Channel::Move,
            SyncEvent::Reset { .. } => Channel::Reset,
            SyncEvent::LeftPlayer { .. } => Channel::Leave,
            SyncEvent::Sync { .. } => Channel::Sync,
        }
    }

    /// Version the sender reached with this event.
    pub fn version(&self) -> u64 {
        match self {
            SyncEvent::Joined { version, .. }
            | SyncEvent::MoveApplied { version, .. }
            | SyncEvent::Reset { version }
            | SyncEvent::LeftPlayer { version, .. } => *version,
            SyncEvent::Sync { snapshot } => *snapshot.version(),
        }
    }
}

/// Envelope carried on a channel: the event plus the server that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct SyncMessage {
    /// Server that accepted the mutation.
    pub origin: ServerId,
    /// The mutation.
    pub event: SyncEvent,
}

impl SyncMessage {
    /// JSON payload for publishing.
    pub fn encode(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a payload received on `channel` under `prefix`.
    ///
    /// The event must belong to the channel it arrived on.
    #[instrument(skip(payload))]
    pub fn decode(prefix: &str, channel: &str, payload: &str) -> Result<Self, StoreError> {
        let expected = Channel::from_name(prefix, channel)
            .ok_or_else(|| StoreError::malformed(channel, "unknown channel"))?;
        let message: Self = serde_json::from_str(payload)
            .map_err(|e| StoreError::malformed(channel, e.to_string()))?;
        if message.event.channel() != expected {
            return Err(StoreError::malformed(
                channel,
                format!("{} event on the {} channel", message.event.channel(), expected),
            ));
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::StoreErrorKind;

    #[test]
    fn test_move_payload_shape() {
        let message = SyncMessage::new(
            ServerId::from("server-a"),
            SyncEvent::MoveApplied {
                row: 1,
                col: 1,
                mark: Mark::X,
                version: 4,
            },
        );
        let json: serde_json::Value = serde_json::from_str(&message.encode().unwrap()).unwrap();
        assert_eq!(json["origin"], "server-a");
        assert_eq!(json["event"]["kind"], "move_applied");
        assert_eq!(json["event"]["mark"], "X");
        assert_eq!(json["event"]["version"], 4);
    }

    #[test]
    fn test_channel_and_version_per_event() {
        let reset = SyncEvent::Reset { version: 9 };
        assert_eq!(reset.channel(), Channel::Reset);
        assert_eq!(reset.version(), 9);

        let sync = SyncEvent::Sync {
            snapshot: GameSnapshot::fresh(12),
        };
        assert_eq!(sync.channel(), Channel::Sync);
        assert_eq!(sync.version(), 12);
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = SyncMessage::decode("tic_tac_toe", "tic_tac_toe:move", "{not json").unwrap_err();
        assert!(matches!(err.kind, StoreErrorKind::MalformedEvent { .. }));
    }

    #[test]
    fn test_event_on_wrong_channel_is_malformed() {
        let payload = SyncMessage::new(ServerId::from("server-a"), SyncEvent::Reset { version: 3 })
            .encode()
            .unwrap();

        let err = SyncMessage::decode("tic_tac_toe", "tic_tac_toe:move", &payload).unwrap_err();
        assert!(matches!(err.kind, StoreErrorKind::MalformedEvent { .. }));

        let err = SyncMessage::decode("tic_tac_toe", "chess:reset", &payload).unwrap_err();
        assert!(matches!(err.kind, StoreErrorKind::MalformedEvent { .. }));

        let message = SyncMessage::decode("tic_tac_toe", "tic_tac_toe:reset", &payload).unwrap();
        assert_eq!(message.event, SyncEvent::Reset { version: 3 });
    }
}
