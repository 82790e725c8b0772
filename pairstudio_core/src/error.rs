use crate::{GridPosition, ObjectId, queue::QueueError};

/// A level description that cannot be turned into a board.
#[derive(Debug, thiserror::Error)]
pub enum LevelError {
    #[error("level id is required")]
    MissingId,
    #[error("level {0} has no map data")]
    EmptyMap(String),
    #[error("the floor was already created; clear the board first")]
    FloorAlreadyCreated,
    #[error("map row {row} has {found} cells, expected {expected}")]
    RaggedMap {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("map declares {declared_width}x{declared_height} but data is {width}x{height}")]
    DimensionMismatch {
        declared_width: usize,
        declared_height: usize,
        width: usize,
        height: usize,
    },
    #[error("level {0} has no win conditions")]
    NoWinConditions(String),
    #[error("{what} at {position} is outside the map")]
    OutOfMap {
        what: String,
        position: GridPosition,
    },
    #[error("object id {0} is used more than once")]
    DuplicateId(ObjectId),
    #[error("boxes {first} and {second} both start at {position}")]
    StackedBoxes {
        first: ObjectId,
        second: ObjectId,
        position: GridPosition,
    },
    #[error("win condition refers to unknown {kind} {id}")]
    UnknownReference { kind: &'static str, id: ObjectId },
    #[error("agent cannot start at {0}: the cell is not walkable")]
    BlockedStart(GridPosition),
    #[error("unknown direction {0:?}")]
    UnknownDirection(String),
    #[error("unknown level {0}")]
    UnknownLevel(String),
    #[error("invalid level json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Structural failures of the game API.
///
/// Expected outcomes such as bumping into a wall are reported as `Ok(false)`,
/// never as a `GameError`.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("no level is loaded")]
    NoLevel,
    #[error("the board has no agent")]
    NoAgent,
    #[error(transparent)]
    Level(#[from] LevelError),
    #[error("action {0} was discarded by a level reset")]
    Discarded(String),
}

impl From<QueueError> for GameError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Discarded(action) => GameError::Discarded(action),
        }
    }
}
