//! Versioned game state.

use crate::{Board, GameStatus, Mark, Seats};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};

/// Complete authoritative game state at one version.
///
/// Owned by [`RulesEngine`](crate::RulesEngine); everything else works on
/// clones. `version` grows on every accepted mutation and is what peers
/// compare to discard stale or duplicate replays.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// The board.
    pub(crate) board: Board,
    /// Game status.
    pub(crate) status: GameStatus,
    /// Mark due to move next.
    pub(crate) next_turn: Mark,
    /// Number of seated players.
    pub(crate) player_count: usize,
    /// Mutation counter.
    pub(crate) version: u64,
    /// Who holds each mark.
    #[serde(default)]
    pub(crate) seats: Seats,
}

impl GameSnapshot {
    /// Empty board, no players, X to move, at `version`.
    pub fn fresh(version: u64) -> Self {
        Self {
            board: Board::new(),
            status: GameStatus::WaitingForPlayers,
            next_turn: Mark::X,
            player_count: 0,
            version,
            seats: Seats::default(),
        }
    }
}

impl Default for GameSnapshot {
    fn default() -> Self {
        Self::fresh(0)
    }
}
