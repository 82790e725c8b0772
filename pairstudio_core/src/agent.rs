use serde::{Deserialize, Serialize};

use crate::{
    Direction, GridPosition, ObjectId,
    object::{Attributes, GridObject},
};

/// Movement state of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Motion {
    #[default]
    Idle,
    /// A step is being animated; the grid position is committed when it ends.
    Moving { to: GridPosition },
}

/// Read-only view of the agent handed to callers outside the action queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub direction: Direction,
    pub row: usize,
    pub col: usize,
    pub is_moving: bool,
    pub carrying: Option<ObjectId>,
}

/// The robot: the one moveable object with a facing and a hand.
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub(crate) position: GridPosition,
    pub(crate) direction: Direction,
    pub(crate) carrying: Option<ObjectId>,
    motion: Motion,
    z_height: u32,
    attributes: Attributes,
}

impl Agent {
    pub(crate) fn new(position: GridPosition, direction: Direction) -> Self {
        Self {
            position,
            direction,
            carrying: None,
            motion: Motion::Idle,
            z_height: 10,
            attributes: Attributes::new(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn carrying(&self) -> Option<&ObjectId> {
        self.carrying.as_ref()
    }

    pub fn motion(&self) -> Motion {
        self.motion
    }

    pub fn is_moving(&self) -> bool {
        matches!(self.motion, Motion::Moving { .. })
    }

    /// The cell directly ahead, or `None` past the top/left edge.
    pub fn front(&self) -> Option<GridPosition> {
        let (d_row, d_col) = self.direction.offset();
        self.position.offset(d_row, d_col)
    }

    /// The cell directly behind.
    pub fn behind(&self) -> Option<GridPosition> {
        let (d_row, d_col) = self.direction.opposite().offset();
        self.position.offset(d_row, d_col)
    }

    /// `Idle -> Moving`. Returns false if a step is already in flight.
    pub(crate) fn begin_move(&mut self, to: GridPosition) -> bool {
        match self.motion {
            Motion::Idle => {
                self.motion = Motion::Moving { to };
                true
            }
            Motion::Moving { .. } => false,
        }
    }

    /// `Moving -> Idle`, committing the destination. Returns the new position.
    pub(crate) fn finish_move(&mut self) -> GridPosition {
        if let Motion::Moving { to } = self.motion {
            self.position = to;
        }
        self.motion = Motion::Idle;
        self.position
    }

    pub fn state(&self) -> AgentState {
        AgentState {
            direction: self.direction,
            row: self.position.row,
            col: self.position.col,
            is_moving: self.is_moving(),
            carrying: self.carrying.clone(),
        }
    }
}

impl GridObject for Agent {
    fn position(&self) -> GridPosition {
        self.position
    }
    fn is_collidable(&self) -> bool {
        true
    }
    fn z_height(&self) -> u32 {
        self.z_height
    }
    fn attributes(&self) -> &Attributes {
        &self.attributes
    }
    fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }
}
