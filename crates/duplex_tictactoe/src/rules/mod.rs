//! Game rules for tic-tac-toe.
//!
//! Pure functions evaluating a board. Rules are kept apart from the
//! engine so that local and replayed moves share one outcome check.

pub mod draw;
pub mod win;

pub use draw::{is_draw, is_full};
pub use win::{LINES, check_winner};
