//! Rule violations reported by the engine.

use derive_more::{Display, Error};

/// A move, join or leave the rules refuse.
///
/// These are business outcomes, not faults: the engine state is unchanged
/// whenever one is returned, and the `Display` text is shown to players
/// verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum RulesError {
    /// Row or column outside 0-2.
    #[display("Invalid move")]
    OutOfBounds,

    /// Target square already holds a mark.
    #[display("Cell already occupied")]
    CellOccupied,

    /// The mark is not the one due to move.
    #[display("Not your turn")]
    NotYourTurn,

    /// The game has been won or drawn.
    #[display("Game over")]
    GameOver,

    /// Both seats are taken.
    #[display("Game full")]
    GameFull,

    /// Moves before both players are seated.
    #[display("Game not in progress")]
    NotInProgress,

    /// Leaving a seat nobody holds.
    #[display("Player not in game")]
    SeatVacant,

    /// A replicated snapshot that breaks the board invariants.
    #[display("Inconsistent snapshot")]
    InconsistentSnapshot,
}
