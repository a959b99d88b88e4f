//! JSON messages exchanged with game clients.

use duplex_tictactoe::{GameSnapshot, GameStatus, Mark};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Intent sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Ask for a seat.
    Join,
    /// Place the caller's mark.
    Move {
        /// Board row, 0-2.
        row: i64,
        /// Board column, 0-2.
        col: i64,
    },
    /// Clear the board and both seats.
    Reset,
}

impl ClientMessage {
    /// Parses a text frame.
    #[instrument]
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Status label as clients see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireStatus {
    /// Waiting for a second player.
    Waiting,
    /// Game running.
    InProgress,
    /// Someone won.
    Won,
    /// Board full, nobody won.
    Draw,
}

impl From<GameStatus> for WireStatus {
    fn from(status: GameStatus) -> Self {
        match status {
            GameStatus::WaitingForPlayers => WireStatus::Waiting,
            GameStatus::InProgress => WireStatus::InProgress,
            GameStatus::Won(_) => WireStatus::Won,
            GameStatus::Draw => WireStatus::Draw,
        }
    }
}

/// Message pushed to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// The caller was seated.
    Joined {
        /// Assigned mark.
        #[serde(rename = "playerId")]
        player_id: Mark,
    },
    /// Current game state.
    Update {
        /// Rows of `""`, `"X"`, `"O"`.
        board: Vec<Vec<String>>,
        /// Mark due to move.
        #[serde(rename = "nextTurn")]
        next_turn: Mark,
        /// Game status.
        status: WireStatus,
        /// Seated players.
        #[serde(rename = "playerCount")]
        player_count: usize,
    },
    /// The game was won.
    Win {
        /// Winning mark.
        winner: Mark,
    },
    /// The game was drawn.
    Draw,
    /// An intent was refused.
    Error {
        /// Reason shown to the player.
        message: String,
    },
}

impl ServerMessage {
    /// An error message.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// State update for `snapshot`.
    pub fn update(snapshot: &GameSnapshot) -> Self {
        ServerMessage::Update {
            board: snapshot.board().rows(),
            next_turn: *snapshot.next_turn(),
            status: (*snapshot.status()).into(),
            player_count: *snapshot.player_count(),
        }
    }

    /// Everything a client is sent after a change: the update, then the
    /// outcome when the game has ended.
    pub fn for_snapshot(snapshot: &GameSnapshot) -> Vec<Self> {
        let mut messages = vec![Self::update(snapshot)];
        match snapshot.status() {
            GameStatus::Won(winner) => messages.push(ServerMessage::Win { winner: *winner }),
            GameStatus::Draw => messages.push(ServerMessage::Draw),
            GameStatus::WaitingForPlayers | GameStatus::InProgress => {}
        }
        messages
    }

    /// JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
