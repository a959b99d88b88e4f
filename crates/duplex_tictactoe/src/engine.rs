//! The rules engine: sole authority over legality and outcome.
//!
//! Two families of transitions exist. The primary API (`join`,
//! `apply_move`, `reset`, `leave`) serves intents originating on this
//! server and bumps the version by one. The `apply_remote_*` family and
//! [`RulesEngine::adopt`] replay mutations another server already accepted:
//! they are no-ops when the incoming version is not newer than ours, and
//! otherwise run the same legality checks before adopting the incoming
//! version.

use crate::invariants::{InvariantSet, InvariantViolation, SnapshotInvariants};
use crate::rules::{check_winner, is_full};
use crate::{Board, GameSnapshot, GameStatus, Mark, Player, RulesError, ServerId, Square};
use strum::IntoEnumIterator;
use tracing::{debug, info, instrument, warn};

/// Result of replaying a remote mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replay {
    /// The mutation was newer than local state and has been applied.
    Applied(GameSnapshot),
    /// The mutation was already seen or superseded; state is unchanged.
    Stale(GameSnapshot),
}

impl Replay {
    /// Snapshot after the replay.
    pub fn snapshot(&self) -> &GameSnapshot {
        match self {
            Replay::Applied(s) | Replay::Stale(s) => s,
        }
    }

    /// True if state changed.
    pub fn is_applied(&self) -> bool {
        matches!(self, Replay::Applied(_))
    }
}

/// Tic-tac-toe engine owning one game's authoritative state.
#[derive(Debug, Clone, Default)]
pub struct RulesEngine {
    state: GameSnapshot,
}

impl RulesEngine {
    /// Creates an engine with an empty board at version 0.
    #[instrument]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hydrates an engine from a persisted snapshot.
    ///
    /// Snapshots that break the board invariants are refused so the caller
    /// can fall back to a fresh game.
    #[instrument(skip(snapshot), fields(version = snapshot.version))]
    pub fn from_snapshot(snapshot: GameSnapshot) -> Result<Self, Vec<InvariantViolation>> {
        SnapshotInvariants::check_all(&snapshot)?;
        info!(status = ?snapshot.status, players = snapshot.player_count, "Hydrated engine");
        Ok(Self { state: snapshot })
    }

    /// Current state.
    pub fn state(&self) -> &GameSnapshot {
        &self.state
    }

    /// Owned copy of the current state.
    pub fn snapshot(&self) -> GameSnapshot {
        self.state.clone()
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.state.version
    }

    /// Seats a new player on the first free mark, X before O.
    #[instrument(skip(self), fields(version = self.state.version))]
    pub fn join(&mut self, home: ServerId) -> Result<Mark, RulesError> {
        let mark = Mark::iter()
            .find(|m| self.state.seats.get(*m).is_none())
            .ok_or_else(|| {
                warn!("Both seats taken");
                RulesError::GameFull
            })?;

        self.seat(Player::new(mark, home));
        self.bump();
        info!(?mark, version = self.state.version, "Player joined");
        Ok(mark)
    }

    /// Places `mark` at `(row, col)` for a locally originated move.
    #[instrument(skip(self), fields(version = self.state.version))]
    pub fn apply_move(
        &mut self,
        row: usize,
        col: usize,
        mark: Mark,
    ) -> Result<GameSnapshot, RulesError> {
        self.check_move(row, col, mark)?;
        self.place(row, col, mark)?;
        self.bump();
        info!(status = ?self.state.status, version = self.state.version, "Move applied");
        Ok(self.snapshot())
    }

    /// Replays a move accepted elsewhere at `incoming_version`.
    #[instrument(skip(self), fields(version = self.state.version))]
    pub fn apply_remote_move(
        &mut self,
        row: usize,
        col: usize,
        mark: Mark,
        incoming_version: u64,
    ) -> Result<Replay, RulesError> {
        if let Some(stale) = self.stale(incoming_version) {
            return Ok(stale);
        }
        self.check_move(row, col, mark)?;
        self.place(row, col, mark)?;
        self.adopt_version(incoming_version);
        Ok(Replay::Applied(self.snapshot()))
    }

    /// Clears the board and both seats. Always succeeds.
    #[instrument(skip(self), fields(version = self.state.version))]
    pub fn reset(&mut self) -> GameSnapshot {
        self.state = GameSnapshot::fresh(self.state.version + 1);
        info!(version = self.state.version, "Game reset");
        self.snapshot()
    }

    /// Replays a reset accepted elsewhere at `incoming_version`.
    #[instrument(skip(self), fields(version = self.state.version))]
    pub fn apply_remote_reset(&mut self, incoming_version: u64) -> Replay {
        if let Some(stale) = self.stale(incoming_version) {
            return stale;
        }
        self.state = GameSnapshot::fresh(incoming_version);
        Replay::Applied(self.snapshot())
    }

    /// Frees the seat held by `mark`. The board is kept.
    #[instrument(skip(self), fields(version = self.state.version))]
    pub fn leave(&mut self, mark: Mark) -> Result<GameSnapshot, RulesError> {
        self.vacate(mark)?;
        self.bump();
        info!(?mark, version = self.state.version, "Player left");
        Ok(self.snapshot())
    }

    /// Replays a seat release accepted elsewhere at `incoming_version`.
    #[instrument(skip(self), fields(version = self.state.version))]
    pub fn apply_remote_leave(
        &mut self,
        mark: Mark,
        incoming_version: u64,
    ) -> Result<Replay, RulesError> {
        if let Some(stale) = self.stale(incoming_version) {
            return Ok(stale);
        }
        self.vacate(mark)?;
        self.adopt_version(incoming_version);
        Ok(Replay::Applied(self.snapshot()))
    }

    /// Replays a join accepted elsewhere at `incoming_version`.
    #[instrument(skip(self), fields(version = self.state.version))]
    pub fn apply_remote_join(
        &mut self,
        player: Player,
        incoming_version: u64,
    ) -> Result<Replay, RulesError> {
        if let Some(stale) = self.stale(incoming_version) {
            return Ok(stale);
        }
        if self.state.seats.get(player.mark).is_some() {
            warn!(mark = ?player.mark, "Remote join for an occupied seat");
            return Err(RulesError::GameFull);
        }
        self.seat(player);
        self.adopt_version(incoming_version);
        Ok(Replay::Applied(self.snapshot()))
    }

    /// Replaces local state with a newer full snapshot from a peer.
    #[instrument(skip(self, snapshot), fields(version = self.state.version, incoming = snapshot.version))]
    pub fn adopt(&mut self, snapshot: GameSnapshot) -> Result<Replay, RulesError> {
        if let Some(stale) = self.stale(snapshot.version) {
            return Ok(stale);
        }
        if let Err(violations) = SnapshotInvariants::check_all(&snapshot) {
            warn!(?violations, "Refusing inconsistent snapshot");
            return Err(RulesError::InconsistentSnapshot);
        }
        self.state = snapshot;
        Ok(Replay::Applied(self.snapshot()))
    }

    fn stale(&self, incoming_version: u64) -> Option<Replay> {
        if incoming_version <= self.state.version {
            debug!(
                incoming_version,
                local_version = self.state.version,
                "Ignoring stale replay"
            );
            Some(Replay::Stale(self.snapshot()))
        } else {
            None
        }
    }

    fn check_move(&self, row: usize, col: usize, mark: Mark) -> Result<(), RulesError> {
        if self.state.status.is_terminal() {
            return Err(RulesError::GameOver);
        }
        if self.state.status == GameStatus::WaitingForPlayers {
            return Err(RulesError::NotInProgress);
        }
        if !Board::in_bounds(row, col) {
            return Err(RulesError::OutOfBounds);
        }
        if mark != self.state.next_turn {
            return Err(RulesError::NotYourTurn);
        }
        if !self.state.board.is_empty(row, col) {
            return Err(RulesError::CellOccupied);
        }
        Ok(())
    }

    fn place(&mut self, row: usize, col: usize, mark: Mark) -> Result<(), RulesError> {
        self.state
            .board
            .set(row, col, Square::Occupied(mark))
            .map_err(|_| RulesError::OutOfBounds)?;
        self.state.next_turn = mark.opponent();

        if let Some(winner) = check_winner(&self.state.board) {
            self.state.status = GameStatus::Won(winner);
        } else if is_full(&self.state.board) {
            self.state.status = GameStatus::Draw;
        }
        Ok(())
    }

    fn seat(&mut self, player: Player) {
        let mark = player.mark;
        *self.state.seats.slot_mut(mark) = Some(player);
        self.state.player_count = self.state.seats.occupied();
        if self.state.status == GameStatus::WaitingForPlayers && self.state.player_count == 2 {
            self.state.status = GameStatus::InProgress;
        }
    }

    fn vacate(&mut self, mark: Mark) -> Result<(), RulesError> {
        self.state
            .seats
            .slot_mut(mark)
            .take()
            .ok_or(RulesError::SeatVacant)?;
        self.state.player_count = self.state.seats.occupied();
        if self.state.status == GameStatus::InProgress {
            self.state.status = GameStatus::WaitingForPlayers;
        }
        Ok(())
    }

    fn bump(&mut self) {
        self.state.version += 1;
        self.debug_check();
    }

    fn adopt_version(&mut self, incoming_version: u64) {
        self.state.version = incoming_version;
        self.debug_check();
    }

    fn debug_check(&self) {
        debug_assert!(
            SnapshotInvariants::check_all(&self.state).is_ok(),
            "snapshot invariants violated: {:?}",
            SnapshotInvariants::check_all(&self.state)
        );
    }
}
