//! First-class invariants over game snapshots.
//!
//! Every snapshot reachable through legal transitions satisfies these.
//! The engine asserts them in debug builds after each mutation and uses
//! them to refuse hydrated or replicated snapshots that could not have
//! been produced by play.

use crate::rules::{check_winner, is_draw, is_full};
use crate::{GameSnapshot, GameStatus, Mark};

/// A logical property that must hold for a given state.
pub trait Invariant<S> {
    /// Checks if the invariant holds for the given state.
    fn holds(state: &S) -> bool;

    /// Human-readable description of the invariant.
    fn description() -> &'static str;
}

/// Violation of an invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Description of the violated invariant.
    pub description: String,
}

impl InvariantViolation {
    /// Creates a new invariant violation.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// A set of invariants checked together.
pub trait InvariantSet<S> {
    /// Returns every violated invariant, or `Ok` when all hold.
    fn check_all(state: &S) -> Result<(), Vec<InvariantViolation>>;
}

impl<S, I1, I2, I3> InvariantSet<S> for (I1, I2, I3)
where
    I1: Invariant<S>,
    I2: Invariant<S>,
    I3: Invariant<S>,
{
    fn check_all(state: &S) -> Result<(), Vec<InvariantViolation>> {
        let mut violations = Vec::new();

        if !I1::holds(state) {
            violations.push(InvariantViolation::new(I1::description()));
        }
        if !I2::holds(state) {
            violations.push(InvariantViolation::new(I2::description()));
        }
        if !I3::holds(state) {
            violations.push(InvariantViolation::new(I3::description()));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// X moves first, so X count equals O count or leads it by one, and the
/// turn marker follows from the counts.
pub struct MarkBalanceInvariant;

impl Invariant<GameSnapshot> for MarkBalanceInvariant {
    fn holds(state: &GameSnapshot) -> bool {
        let xs = state.board.count(Mark::X);
        let os = state.board.count(Mark::O);
        let expected_turn = if xs == os { Mark::X } else { Mark::O };
        (xs == os || xs == os + 1) && state.next_turn == expected_turn
    }

    fn description() -> &'static str {
        "X count equals O count or exceeds it by one, and the turn follows"
    }
}

/// `player_count` mirrors the occupied seats and never exceeds two.
pub struct SeatCountInvariant;

impl Invariant<GameSnapshot> for SeatCountInvariant {
    fn holds(state: &GameSnapshot) -> bool {
        state.player_count == state.seats.occupied() && state.player_count <= 2
    }

    fn description() -> &'static str {
        "Player count matches the occupied seats"
    }
}

/// Status is consistent with the board: a `Won` mark owns a line, a draw
/// is a full board, and play only runs with both seats taken.
pub struct StatusMatchesBoardInvariant;

impl Invariant<GameSnapshot> for StatusMatchesBoardInvariant {
    fn holds(state: &GameSnapshot) -> bool {
        let winner = check_winner(&state.board);
        match state.status {
            GameStatus::Won(mark) => winner == Some(mark),
            GameStatus::Draw => is_draw(&state.board),
            GameStatus::InProgress => {
                state.player_count == 2 && winner.is_none() && !is_full(&state.board)
            }
            GameStatus::WaitingForPlayers => state.player_count < 2 && winner.is_none(),
        }
    }

    fn description() -> &'static str {
        "Status agrees with the board and the seats"
    }
}

/// The invariants every snapshot must satisfy.
pub type SnapshotInvariants = (
    MarkBalanceInvariant,
    SeatCountInvariant,
    StatusMatchesBoardInvariant,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Square;

    #[test]
    fn test_fresh_snapshot_holds() {
        assert!(SnapshotInvariants::check_all(&GameSnapshot::fresh(0)).is_ok());
    }

    #[test]
    fn test_two_x_lead_violates_balance() {
        let mut snapshot = GameSnapshot::fresh(3);
        snapshot.board.set(0, 0, Square::Occupied(Mark::X)).unwrap();
        snapshot.board.set(0, 1, Square::Occupied(Mark::X)).unwrap();
        let violations = SnapshotInvariants::check_all(&snapshot).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].description, MarkBalanceInvariant::description());
    }

    #[test]
    fn test_seat_count_mismatch_detected() {
        let mut snapshot = GameSnapshot::fresh(1);
        snapshot.player_count = 1;
        assert!(!SeatCountInvariant::holds(&snapshot));
    }

    #[test]
    fn test_false_winner_detected() {
        let mut snapshot = GameSnapshot::fresh(1);
        snapshot.status = GameStatus::Won(Mark::O);
        assert!(!StatusMatchesBoardInvariant::holds(&snapshot));
    }
}
