use std::fmt;

use serde::{Deserialize, Serialize};

pub mod agent;
pub mod board;
pub mod catalog;
pub mod controller;
pub mod direction;
pub mod error;
pub mod iso;
pub mod level;
pub mod map;
pub mod object;
pub mod queue;
pub mod rules;
pub mod session;
pub mod settings;

pub use catalog::LevelCatalog;
pub use direction::{Direction, Turn};
pub use error::{GameError, LevelError};
pub use level::LevelConfig;
pub use session::{GameObserver, GameSession, TracingObserver};
pub use settings::{Settings, Timing};

/// A cell on the board, addressed by row and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPosition {
    pub row: usize,
    pub col: usize,
}

impl GridPosition {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Offsets the position, returning `None` if either coordinate would go negative.
    pub fn offset(self, d_row: isize, d_col: isize) -> Option<Self> {
        Some(Self {
            row: self.row.checked_add_signed(d_row)?,
            col: self.col.checked_add_signed(d_col)?,
        })
    }

    /// The isometric diagonal index used for depth sorting.
    #[inline]
    pub fn diagonal(self) -> usize {
        self.row + self.col
    }
}

impl fmt::Display for GridPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Level-unique identifier of a placed object (box, conveyor).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl ObjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObjectId {
    fn from(value: &str) -> Self {
        ObjectId(value.to_string())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
