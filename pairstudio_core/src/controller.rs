//! The only code that moves the agent or changes what it carries.
//!
//! Every operation checks its preconditions first and mutates nothing when
//! one fails, reporting `Ok(false)`. `Err` is reserved for a board with no
//! agent. Animation time is awaited inside the operation, so a caller that
//! awaits one action before issuing the next observes settled state.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::{
    Direction, GridPosition, ObjectId, Turn,
    agent::{Agent, AgentState},
    board::{Board, Tile},
    error::GameError,
    object::{AttributeValue, Attributes, GridObject},
    settings::{Timing, pause},
};

/// Which way a step goes relative to the agent's facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heading {
    Forward,
    Backward,
}

/// What occupies the cell in front of the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrontKind {
    /// Empty, walkable floor.
    Floor,
    /// Off the board or a hole.
    Wall,
    /// An uncarried moveable object of the given kind.
    Moveable(String),
    /// A stationary object of the given kind.
    Stationary(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontView {
    pub kind: FrontKind,
    pub id: Option<ObjectId>,
    pub attributes: Attributes,
}

impl FrontView {
    fn bare(kind: FrontKind) -> Self {
        Self {
            kind,
            id: None,
            attributes: Attributes::new(),
        }
    }

    /// `"floor"`, `"wall"`, or the object's kind such as `"box"` or `"conveyor"`.
    pub fn type_name(&self) -> &str {
        match &self.kind {
            FrontKind::Floor => "floor",
            FrontKind::Wall => "wall",
            FrontKind::Moveable(kind) | FrontKind::Stationary(kind) => kind,
        }
    }

    /// True if the object ahead carries `name = true`.
    pub fn has_flag(&self, name: &str) -> bool {
        matches!(self.attributes.get_named(name), Some(AttributeValue::Bool(true)))
    }
}

fn agent(board: &Board) -> Result<&Agent, GameError> {
    board.agent().ok_or(GameError::NoAgent)
}

fn agent_mut(board: &mut Board) -> Result<&mut Agent, GameError> {
    board.agent_mut().ok_or(GameError::NoAgent)
}

/// The cell the agent faces. `None` when that cell is past the top or left edge.
pub fn front_coordinates(board: &Board) -> Result<Option<GridPosition>, GameError> {
    Ok(agent(board)?.front())
}

/// Describes the cell ahead without touching anything.
pub fn survey_front(board: &Board) -> Result<FrontView, GameError> {
    let Some(front) = agent(board)?.front().filter(|p| board.in_bounds(*p)) else {
        return Ok(FrontView::bare(FrontKind::Wall));
    };
    if let Some(item) = board.moveable_at(front) {
        return Ok(FrontView {
            kind: FrontKind::Moveable(item.kind().to_string()),
            id: Some(item.id().clone()),
            attributes: item.attributes().clone(),
        });
    }
    if let Some(fixture) = board.stationary_at(front) {
        return Ok(FrontView {
            kind: FrontKind::Stationary(fixture.kind().to_string()),
            id: fixture.id().cloned(),
            attributes: fixture.attributes().clone(),
        });
    }
    if board.is_walkable(front) {
        Ok(FrontView::bare(FrontKind::Floor))
    } else {
        Ok(FrontView::bare(FrontKind::Wall))
    }
}

/// Which level instance may still publish.
///
/// Clones share one counter. [`Generation::next`] hands out a new live
/// generation and retires every older one.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    current: Arc<AtomicU64>,
    mine: u64,
}

impl Generation {
    pub fn next(&self) -> Self {
        let mine = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        Self {
            current: self.current.clone(),
            mine,
        }
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.mine
    }

    /// Stores `value` unless this generation has been retired.
    ///
    /// The check runs under the channel's lock, so a retired writer can never
    /// land after the value published by its successor.
    pub fn publish<T>(&self, tx: &watch::Sender<T>, value: T) -> bool {
        tx.send_if_modified(|slot| {
            if !self.is_current() {
                return false;
            }
            *slot = value;
            true
        })
    }
}

/// Drives the agent on a board, pacing each action by [`Timing`].
#[derive(Debug)]
pub struct Controller {
    timing: Timing,
    published: Arc<watch::Sender<Option<AgentState>>>,
    generation: Generation,
}

impl Controller {
    pub fn new(timing: Timing) -> Self {
        let (tx, _) = watch::channel(None);
        Self::with_publisher(timing, Arc::new(tx), Generation::default())
    }

    /// Publishes agent snapshots (including mid-step ones) on `published`
    /// for as long as `generation` stays current.
    pub fn with_publisher(
        timing: Timing,
        published: Arc<watch::Sender<Option<AgentState>>>,
        generation: Generation,
    ) -> Self {
        Self {
            timing,
            published,
            generation,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<AgentState>> {
        self.published.subscribe()
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    fn publish(&self, board: &Board) {
        self.generation.publish(&self.published, board.agent().map(Agent::state));
    }

    /// Quarter turn. Only refused while a step is in flight.
    pub async fn rotate(&self, board: &mut Board, turn: Turn) -> Result<bool, GameError> {
        let agent = agent_mut(board)?;
        if agent.is_moving() {
            return Ok(false);
        }
        agent.direction = agent.direction.rotated(turn);
        debug!(direction = %agent.direction, "turned");
        self.publish(board);
        pause(self.timing.turn_ms).await;
        Ok(true)
    }

    /// Turns to face `direction` directly.
    pub async fn face(&self, board: &mut Board, direction: Direction) -> Result<bool, GameError> {
        let agent = agent_mut(board)?;
        if agent.is_moving() {
            return Ok(false);
        }
        agent.direction = direction;
        self.publish(board);
        pause(self.timing.face_ms).await;
        Ok(true)
    }

    /// One tile forward or backward. A carried item travels with the agent.
    pub async fn step(&self, board: &mut Board, heading: Heading) -> Result<bool, GameError> {
        let current = agent(board)?;
        if current.is_moving() {
            return Ok(false);
        }
        let target = match heading {
            Heading::Forward => current.front(),
            Heading::Backward => current.behind(),
        };
        let Some(target) = target.filter(|t| board.in_bounds(*t)) else {
            debug!(?heading, "step would leave the board");
            return Ok(false);
        };
        if !board.is_walkable(target) {
            debug!(%target, "step blocked");
            return Ok(false);
        }

        if !agent_mut(board)?.begin_move(target) {
            return Ok(false);
        }
        self.publish(board);
        pause(self.timing.move_ms).await;

        let agent = agent_mut(board)?;
        let arrived = agent.finish_move();
        if let Some(id) = agent.carrying.clone() {
            if let Some(item) = board.moveable_mut(&id) {
                item.position = arrived;
            }
        }
        board.update_depth();
        self.publish(board);
        debug!(position = %arrived, "stepped");
        Ok(true)
    }

    /// Lifts the pickupable item directly ahead.
    pub async fn pick_up(&self, board: &mut Board) -> Result<bool, GameError> {
        let current = agent(board)?;
        if current.is_moving() || current.carrying.is_some() {
            return Ok(false);
        }
        let holder = current.position();
        let Some(front) = current.front() else {
            return Ok(false);
        };
        let Some(id) = board
            .moveable_at(front)
            .filter(|item| item.is_pickupable())
            .map(|item| item.id().clone())
        else {
            debug!(%front, "nothing to pick up");
            return Ok(false);
        };

        if let Some(item) = board.moveable_mut(&id) {
            item.carried = true;
            item.position = holder;
        }
        agent_mut(board)?.carrying = Some(id.clone());
        board.update_depth();
        self.publish(board);
        debug!(item = %id, from = %front, "picked up");
        pause(self.timing.pick_ms).await;
        Ok(true)
    }

    /// Puts the carried item down on the cell ahead.
    ///
    /// Refused when nothing is carried, the cell is off the floor, another item
    /// rests there, or a collidable fixture there does not allow drops.
    pub async fn drop_item(&self, board: &mut Board) -> Result<bool, GameError> {
        let current = agent(board)?;
        if current.is_moving() {
            return Ok(false);
        }
        let Some(id) = current.carrying.clone() else {
            return Ok(false);
        };
        let Some(front) = current.front() else {
            return Ok(false);
        };
        if !matches!(board.tile(front), Some(Tile::Floor { .. })) {
            return Ok(false);
        }
        if board.moveable_at(front).is_some() {
            debug!(%front, "drop target occupied");
            return Ok(false);
        }
        if let Some(fixture) = board.stationary_at(front) {
            if fixture.is_collidable() && !fixture.allows_drop() {
                debug!(%front, kind = fixture.kind(), "fixture refuses drops");
                return Ok(false);
            }
        }

        if let Some(item) = board.moveable_mut(&id) {
            item.carried = false;
            item.position = front;
        }
        agent_mut(board)?.carrying = None;
        board.update_depth();
        self.publish(board);
        debug!(item = %id, to = %front, "dropped");
        Ok(true)
    }

    /// Teleports the agent (and anything it carries) to a walkable cell.
    pub async fn set_position(
        &self,
        board: &mut Board,
        to: GridPosition,
    ) -> Result<bool, GameError> {
        if agent(board)?.is_moving() {
            return Ok(false);
        }
        if !board.is_walkable(to) {
            return Ok(false);
        }
        let agent = agent_mut(board)?;
        agent.position = to;
        if let Some(id) = agent.carrying.clone() {
            if let Some(item) = board.moveable_mut(&id) {
                item.position = to;
            }
        }
        board.update_depth();
        self.publish(board);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{MoveableConfig, StationaryConfig};

    fn board(rows: usize, cols: usize) -> Board {
        let mut board = Board::new(64, 32);
        board.create_floor(&vec![vec![0; cols]; rows]).unwrap();
        board
    }

    fn controller() -> Controller {
        Controller::new(Timing::instant())
    }

    fn at(row: usize, col: usize) -> GridPosition {
        GridPosition::new(row, col)
    }

    #[tokio::test]
    async fn blocked_by_fixture_leaves_agent_untouched() {
        let mut b = board(3, 3);
        b.add_stationary_object(at(0, 1), StationaryConfig::conveyor("c")).unwrap();
        b.place_agent(at(1, 1), Direction::North).unwrap();
        let before = b.agent().unwrap().state();

        assert!(!controller().step(&mut b, Heading::Forward).await.unwrap());
        assert_eq!(b.agent().unwrap().state(), before);
    }

    #[tokio::test]
    async fn cannot_walk_off_the_top_edge() {
        let mut b = board(2, 2);
        b.place_agent(at(0, 0), Direction::North).unwrap();
        assert!(!controller().step(&mut b, Heading::Forward).await.unwrap());
        assert_eq!(b.agent().unwrap().position(), at(0, 0));
    }

    #[tokio::test]
    async fn cannot_walk_off_the_bottom_edge_or_into_holes() {
        let mut b = Board::new(64, 32);
        b.create_floor(&[vec![0, -1], vec![0, 0]]).unwrap();
        b.place_agent(at(1, 0), Direction::South).unwrap();
        let c = controller();
        assert!(!c.step(&mut b, Heading::Forward).await.unwrap());
        assert!(c.rotate(&mut b, Turn::Clockwise).await.unwrap());
        assert!(c.face(&mut b, Direction::North).await.unwrap());
        assert!(c.step(&mut b, Heading::Forward).await.unwrap());
        assert!(c.face(&mut b, Direction::East).await.unwrap());
        assert!(!c.step(&mut b, Heading::Forward).await.unwrap());
        assert_eq!(b.agent().unwrap().position(), at(0, 0));
    }

    #[tokio::test]
    async fn backward_keeps_facing() {
        let mut b = board(3, 3);
        b.place_agent(at(1, 1), Direction::East).unwrap();
        assert!(controller().step(&mut b, Heading::Backward).await.unwrap());
        let agent = b.agent().unwrap();
        assert_eq!(agent.position(), at(1, 0));
        assert_eq!(agent.direction(), Direction::East);
    }

    #[tokio::test]
    async fn carried_item_moves_with_agent() {
        let mut b = board(3, 3);
        b.add_moveable_object(at(0, 1), MoveableConfig::boxed("box")).unwrap();
        b.place_agent(at(1, 1), Direction::North).unwrap();
        let c = controller();

        assert!(c.pick_up(&mut b).await.unwrap());
        assert!(c.rotate(&mut b, Turn::Clockwise).await.unwrap());
        assert!(c.step(&mut b, Heading::Forward).await.unwrap());
        let item = b.moveable_by_id(&ObjectId::from("box")).unwrap();
        assert!(item.is_carried());
        assert_eq!(item.position(), at(1, 2));
        // the box's old cell is free again
        assert!(b.is_walkable(at(0, 1)));
    }

    #[tokio::test]
    async fn second_pick_up_keeps_first_item() {
        let mut b = board(3, 3);
        b.add_moveable_object(at(0, 1), MoveableConfig::boxed("first")).unwrap();
        b.add_moveable_object(at(1, 2), MoveableConfig::boxed("second")).unwrap();
        b.place_agent(at(1, 1), Direction::North).unwrap();
        let c = controller();

        assert!(c.pick_up(&mut b).await.unwrap());
        assert!(c.face(&mut b, Direction::East).await.unwrap());
        assert!(!c.pick_up(&mut b).await.unwrap());
        assert_eq!(b.agent().unwrap().carrying(), Some(&ObjectId::from("first")));
        assert!(!b.moveable_by_id(&ObjectId::from("second")).unwrap().is_carried());
    }

    #[tokio::test]
    async fn unpickupable_items_stay_put() {
        let mut b = board(2, 2);
        let mut anchor = MoveableConfig::boxed("anchor");
        anchor.pickupable = false;
        b.add_moveable_object(at(0, 0), anchor).unwrap();
        b.place_agent(at(1, 0), Direction::North).unwrap();
        assert!(!controller().pick_up(&mut b).await.unwrap());
        assert!(b.agent().unwrap().carrying().is_none());
    }

    #[tokio::test]
    async fn drop_rules() {
        let mut b = board(3, 3);
        b.add_stationary_object(at(0, 0), StationaryConfig::conveyor("belt")).unwrap();
        b.add_stationary_object(at(2, 1), StationaryConfig::new("pillar")).unwrap();
        b.add_moveable_object(at(1, 2), MoveableConfig::boxed("other")).unwrap();
        b.add_moveable_object(at(0, 1), MoveableConfig::boxed("held")).unwrap();
        b.place_agent(at(1, 1), Direction::North).unwrap();
        let c = controller();

        assert!(!c.drop_item(&mut b).await.unwrap(), "nothing carried yet");
        assert!(c.pick_up(&mut b).await.unwrap());

        c.face(&mut b, Direction::East).await.unwrap();
        assert!(!c.drop_item(&mut b).await.unwrap(), "occupied by another box");
        c.face(&mut b, Direction::South).await.unwrap();
        assert!(!c.drop_item(&mut b).await.unwrap(), "solid fixture");

        assert!(c.set_position(&mut b, at(0, 1)).await.unwrap());
        c.face(&mut b, Direction::West).await.unwrap();
        assert!(c.drop_item(&mut b).await.unwrap(), "conveyor accepts drops");
        let held = b.moveable_by_id(&ObjectId::from("held")).unwrap();
        assert!(!held.is_carried());
        assert_eq!(held.position(), at(0, 0));
        assert!(b.agent().unwrap().carrying().is_none());
    }

    #[tokio::test]
    async fn set_position_rejects_blocked_cells() {
        let mut b = board(2, 2);
        b.add_moveable_object(at(0, 0), MoveableConfig::boxed("b")).unwrap();
        b.place_agent(at(1, 1), Direction::North).unwrap();
        let c = controller();
        assert!(!c.set_position(&mut b, at(0, 0)).await.unwrap());
        assert!(!c.set_position(&mut b, at(5, 5)).await.unwrap());
        assert!(c.set_position(&mut b, at(1, 0)).await.unwrap());
        assert_eq!(b.agent().unwrap().position(), at(1, 0));
    }

    #[tokio::test]
    async fn moving_agent_refuses_every_action() {
        let mut b = board(3, 3);
        b.add_moveable_object(at(0, 1), MoveableConfig::boxed("b")).unwrap();
        b.place_agent(at(1, 1), Direction::North).unwrap();
        b.agent_mut().unwrap().begin_move(at(1, 0));
        let c = controller();

        assert!(!c.step(&mut b, Heading::Forward).await.unwrap());
        assert!(!c.rotate(&mut b, Turn::Clockwise).await.unwrap());
        assert!(!c.face(&mut b, Direction::South).await.unwrap());
        assert!(!c.pick_up(&mut b).await.unwrap());
        assert!(!c.set_position(&mut b, at(2, 2)).await.unwrap());
        assert_eq!(b.agent().unwrap().direction(), Direction::North);
    }

    #[tokio::test]
    async fn snapshots_are_published() {
        let mut b = board(2, 2);
        b.place_agent(at(1, 0), Direction::North).unwrap();
        let c = controller();
        let rx = c.subscribe();
        c.step(&mut b, Heading::Forward).await.unwrap();
        let state = rx.borrow().clone().unwrap();
        assert_eq!((state.row, state.col, state.is_moving), (0, 0, false));
    }

    #[tokio::test]
    async fn retired_generation_stops_publishing() {
        let mut b = board(3, 1);
        b.place_agent(at(2, 0), Direction::North).unwrap();
        let (tx, rx) = watch::channel(None);
        let old = Generation::default();
        let c = Controller::with_publisher(Timing::instant(), Arc::new(tx), old.clone());

        c.step(&mut b, Heading::Forward).await.unwrap();
        assert_eq!(rx.borrow().as_ref().map(|s| s.row), Some(1));

        let live = old.next();
        assert!(!old.is_current());
        assert!(live.is_current());
        c.step(&mut b, Heading::Forward).await.unwrap();
        assert_eq!(b.agent().unwrap().position(), at(0, 0));
        assert_eq!(rx.borrow().as_ref().map(|s| s.row), Some(1));
    }

    #[test]
    fn survey_reports_what_is_ahead() {
        let mut b = board(2, 3);
        b.add_stationary_object(at(0, 0), StationaryConfig::conveyor("in")).unwrap();
        b.add_moveable_object(at(1, 1), MoveableConfig::boxed("box")).unwrap();
        b.place_agent(at(1, 0), Direction::North).unwrap();

        let view = survey_front(&b).unwrap();
        assert_eq!(view.type_name(), "conveyor");
        assert_eq!(view.id, Some(ObjectId::from("in")));
        assert!(view.has_flag("allowDrop"));

        b.agent_mut().unwrap().direction = Direction::East;
        let view = survey_front(&b).unwrap();
        assert_eq!(view.type_name(), "box");
        assert!(!view.has_flag("broken"));

        b.agent_mut().unwrap().direction = Direction::West;
        assert_eq!(survey_front(&b).unwrap().kind, FrontKind::Wall);
        b.agent_mut().unwrap().direction = Direction::South;
        assert_eq!(survey_front(&b).unwrap().kind, FrontKind::Wall);
        assert_eq!(front_coordinates(&b).unwrap(), Some(at(2, 0)));
    }

    #[test]
    fn empty_board_is_a_structural_error() {
        let b = board(1, 1);
        assert!(matches!(survey_front(&b), Err(GameError::NoAgent)));
    }
}
