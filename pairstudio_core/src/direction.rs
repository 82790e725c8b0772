use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::LevelError;

/// Facing of the agent on the board.
///
/// On screen NORTH points up-right (row - 1), EAST down-right (col + 1),
/// SOUTH down-left (row + 1) and WEST up-left (col - 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "DirectionRepr")]
pub enum Direction {
    North,
    East,
    South,
    West,
}

/// One quarter turn, the `±1` of a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Turn {
    Clockwise,
    CounterClockwise,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    pub fn clockwise(self) -> Self {
        match self {
            Direction::North => Direction::East,
            Direction::East => Direction::South,
            Direction::South => Direction::West,
            Direction::West => Direction::North,
        }
    }

    pub fn counter_clockwise(self) -> Self {
        match self {
            Direction::North => Direction::West,
            Direction::West => Direction::South,
            Direction::South => Direction::East,
            Direction::East => Direction::North,
        }
    }

    pub fn rotated(self, turn: Turn) -> Self {
        match turn {
            Turn::Clockwise => self.clockwise(),
            Turn::CounterClockwise => self.counter_clockwise(),
        }
    }

    pub fn opposite(self) -> Self {
        self.clockwise().clockwise()
    }

    /// `(Δrow, Δcol)` of one step forward.
    pub fn offset(self) -> (isize, isize) {
        match self {
            Direction::North => (-1, 0),
            Direction::East => (0, 1),
            Direction::South => (1, 0),
            Direction::West => (0, -1),
        }
    }

    /// Index used by level files and sprite sheets: SOUTH=0, EAST=1, WEST=2, NORTH=3.
    pub fn index(self) -> u8 {
        match self {
            Direction::South => 0,
            Direction::East => 1,
            Direction::West => 2,
            Direction::North => 3,
        }
    }

    pub fn from_index(index: u8) -> Result<Self, LevelError> {
        match index {
            0 => Ok(Direction::South),
            1 => Ok(Direction::East),
            2 => Ok(Direction::West),
            3 => Ok(Direction::North),
            other => Err(LevelError::UnknownDirection(other.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::North => "NORTH",
            Direction::East => "EAST",
            Direction::South => "SOUTH",
            Direction::West => "WEST",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Direction {
    type Err = LevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NORTH" | "N" => Ok(Direction::North),
            "EAST" | "E" => Ok(Direction::East),
            "SOUTH" | "S" => Ok(Direction::South),
            "WEST" | "W" => Ok(Direction::West),
            _ => Err(LevelError::UnknownDirection(s.to_string())),
        }
    }
}

/// Level files spell a direction either as its index or its name.
#[derive(Deserialize)]
#[serde(untagged)]
enum DirectionRepr {
    Index(u8),
    Name(String),
}

impl TryFrom<DirectionRepr> for Direction {
    type Error = LevelError;

    fn try_from(repr: DirectionRepr) -> Result<Self, Self::Error> {
        match repr {
            DirectionRepr::Index(i) => Direction::from_index(i),
            DirectionRepr::Name(name) => name.parse(),
        }
    }
}
