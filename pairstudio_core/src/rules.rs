//! Terminal outcome of a level: declarative win conditions plus the global
//! "nothing rests on bare floor" fail rule.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    GridPosition, ObjectId,
    board::Board,
    object::{GridObject, MoveableObject},
};

/// One clause of a level's win predicate. All clauses must hold at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum WinCondition {
    /// The item rests, uncarried, on exactly this cell.
    #[serde(rename = "itemAtPos")]
    ItemAtPos { item_id: ObjectId, row: usize, col: usize },
    /// The item rests, uncarried, on the cell of the named stationary object.
    #[serde(rename = "itemOnStationary")]
    ItemOnStationary {
        item_id: ObjectId,
        stationary_id: ObjectId,
    },
}

impl WinCondition {
    pub fn item_id(&self) -> &ObjectId {
        match self {
            WinCondition::ItemAtPos { item_id, .. }
            | WinCondition::ItemOnStationary { item_id, .. } => item_id,
        }
    }

    pub fn is_met(&self, board: &Board) -> bool {
        let Some(item) = board.moveable_by_id(self.item_id()).filter(|i| !i.is_carried()) else {
            return false;
        };
        match self {
            WinCondition::ItemAtPos { row, col, .. } => {
                item.position() == GridPosition::new(*row, *col)
            }
            WinCondition::ItemOnStationary { stationary_id, .. } => board
                .stationary_by_id(stationary_id)
                .is_some_and(|s| s.position() == item.position()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailReason {
    /// An uncarried item rests somewhere that does not accept drops.
    ItemOnFloor { item: ObjectId, position: GridPosition },
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::ItemOnFloor { .. } => f.write_str("Box dropped on the floor!"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Won,
    Failed(FailReason),
}

impl Outcome {
    pub fn is_won(&self) -> bool {
        matches!(self, Outcome::Won)
    }
}

fn on_drop_surface(board: &Board, item: &MoveableObject) -> bool {
    board
        .stationary_at(item.position())
        .is_some_and(|s| s.allows_drop())
}

/// First resting item, in registration order, that is not on an allow-drop surface.
pub fn check_fail(board: &Board) -> Option<FailReason> {
    board
        .resting_moveables()
        .find(|item| !on_drop_surface(board, item))
        .map(|item| FailReason::ItemOnFloor {
            item: item.id().clone(),
            position: item.position(),
        })
}

/// True when every condition holds. An empty list never wins.
pub fn check_win(conditions: &[WinCondition], board: &Board) -> bool {
    !conditions.is_empty() && conditions.iter().all(|c| c.is_met(board))
}

/// Fail is checked first: a bad drop loses even if the win predicate also holds.
pub fn evaluate(conditions: &[WinCondition], board: &Board) -> Option<Outcome> {
    if let Some(reason) = check_fail(board) {
        return Some(Outcome::Failed(reason));
    }
    check_win(conditions, board).then_some(Outcome::Won)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Medal {
    Gold,
    Silver,
    Bronze,
}

/// Step thresholds for each medal; a win within `gold` steps earns gold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medals {
    pub gold: Option<u32>,
    pub silver: Option<u32>,
    pub bronze: Option<u32>,
}

impl Medals {
    pub fn grade(&self, steps: u32) -> Option<Medal> {
        [
            (self.gold, Medal::Gold),
            (self.silver, Medal::Silver),
            (self.bronze, Medal::Bronze),
        ]
        .into_iter()
        .find_map(|(limit, medal)| limit.filter(|limit| steps <= *limit).map(|_| medal))
    }
}
