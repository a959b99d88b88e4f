//! Pure tic-tac-toe rules with versioned state.
//!
//! This crate knows nothing about networks or storage. It owns the board,
//! turn order, seats and outcome of a single game, and exposes two ways to
//! mutate them: a primary API for moves that originate on the local server,
//! and a version-guarded replay API for moves that another server already
//! accepted.
//!
//! # Example
//!
//! ```
//! use duplex_tictactoe::{GameStatus, Mark, RulesEngine};
//!
//! let mut engine = RulesEngine::new();
//! assert_eq!(engine.join("server-a".into()), Ok(Mark::X));
//! assert_eq!(engine.join("server-b".into()), Ok(Mark::O));
//!
//! let snapshot = engine.apply_move(1, 1, Mark::X).unwrap();
//! assert_eq!(*snapshot.status(), GameStatus::InProgress);
//! assert_eq!(*snapshot.version(), 3);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod engine;
mod error;
pub mod invariants;
pub mod rules;
mod snapshot;
mod types;

pub use engine::{Replay, RulesEngine};
pub use error::RulesError;
pub use snapshot::GameSnapshot;
pub use types::{BOARD_SIZE, Board, GameStatus, Mark, Player, Seats, ServerId, Square};
