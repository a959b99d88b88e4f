//! Core domain types for tic-tac-toe.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use strum::EnumIter;

/// A player's mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
pub enum Mark {
    /// Mark X (moves first).
    X,
    /// Mark O (moves second).
    O,
}

impl Mark {
    /// Returns the opposing mark.
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

/// A square on the tic-tac-toe board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Square {
    /// Empty square.
    Empty,
    /// Square holding a mark.
    Occupied(Mark),
}

impl Square {
    /// Wire label for the square: `""`, `"X"` or `"O"`.
    pub fn label(self) -> &'static str {
        match self {
            Square::Empty => "",
            Square::Occupied(Mark::X) => "X",
            Square::Occupied(Mark::O) => "O",
        }
    }
}

/// Side length of the board.
pub const BOARD_SIZE: usize = 3;

/// 3x3 tic-tac-toe board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// Squares in row-major order (0-8).
    squares: [Square; 9],
}

impl Board {
    /// Creates a new empty board.
    pub fn new() -> Self {
        Self {
            squares: [Square::Empty; 9],
        }
    }

    /// Returns true if `row` and `col` address a square.
    pub fn in_bounds(row: usize, col: usize) -> bool {
        row < BOARD_SIZE && col < BOARD_SIZE
    }

    /// Gets the square at `(row, col)`, or `None` when out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<Square> {
        if !Self::in_bounds(row, col) {
            return None;
        }
        self.squares.get(row * BOARD_SIZE + col).copied()
    }

    /// Sets the square at `(row, col)`.
    pub fn set(&mut self, row: usize, col: usize, square: Square) -> Result<(), &'static str> {
        if !Self::in_bounds(row, col) {
            return Err("Position out of bounds");
        }
        self.squares[row * BOARD_SIZE + col] = square;
        Ok(())
    }

    /// Checks if a square is empty. Out-of-bounds squares are never empty.
    pub fn is_empty(&self, row: usize, col: usize) -> bool {
        matches!(self.get(row, col), Some(Square::Empty))
    }

    /// Returns all squares as a slice.
    pub fn squares(&self) -> &[Square; 9] {
        &self.squares
    }

    /// Number of squares holding `mark`.
    pub fn count(&self, mark: Mark) -> usize {
        self.squares
            .iter()
            .filter(|s| **s == Square::Occupied(mark))
            .count()
    }

    /// Board as rows of wire labels.
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.squares
            .chunks(BOARD_SIZE)
            .map(|row| row.iter().map(|s| s.label().to_string()).collect())
            .collect()
    }

    /// Formats the board as a human-readable string.
    pub fn display(&self) -> String {
        let mut result = String::new();
        for row in 0..BOARD_SIZE {
            for col in 0..BOARD_SIZE {
                let symbol = match self.squares[row * BOARD_SIZE + col] {
                    Square::Empty => ".",
                    Square::Occupied(Mark::X) => "X",
                    Square::Occupied(Mark::O) => "O",
                };
                result.push_str(symbol);
                if col < BOARD_SIZE - 1 {
                    result.push('|');
                }
            }
            if row < BOARD_SIZE - 1 {
                result.push_str("\n-+-+-\n");
            }
        }
        result
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

/// Current status of the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    /// Fewer than two players are seated.
    WaitingForPlayers,
    /// Both seats are taken and moves are accepted.
    InProgress,
    /// Game ended in a win.
    Won(Mark),
    /// Game ended in a draw.
    Draw,
}

impl GameStatus {
    /// Won and Draw accept no further moves until reset.
    pub fn is_terminal(self) -> bool {
        matches!(self, GameStatus::Won(_) | GameStatus::Draw)
    }
}

/// Tag naming the server that accepted a player's join.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    /// Creates a server tag.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A seated player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// The player's mark.
    pub mark: Mark,
    /// Server that accepted the join.
    pub home: ServerId,
}

impl Player {
    /// Creates a player.
    pub fn new(mark: Mark, home: ServerId) -> Self {
        Self { mark, home }
    }
}

/// The two player slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seats {
    /// Player holding X.
    pub x: Option<Player>,
    /// Player holding O.
    pub o: Option<Player>,
}

impl Seats {
    /// Returns the player holding `mark`.
    pub fn get(&self, mark: Mark) -> Option<&Player> {
        match mark {
            Mark::X => self.x.as_ref(),
            Mark::O => self.o.as_ref(),
        }
    }

    pub(crate) fn slot_mut(&mut self, mark: Mark) -> &mut Option<Player> {
        match mark {
            Mark::X => &mut self.x,
            Mark::O => &mut self.o,
        }
    }

    /// Number of occupied seats.
    pub fn occupied(&self) -> usize {
        usize::from(self.x.is_some()) + usize::from(self.o.is_some())
    }

    /// Seated players, X first.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.x.iter().chain(self.o.iter())
    }
}
