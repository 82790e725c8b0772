use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    Direction, GridPosition, ObjectId,
    agent::Agent,
    error::LevelError,
    iso::{self, ScreenPoint},
    map::Grid,
    object::{GridObject, MoveableConfig, MoveableObject, StationaryConfig, StationaryObject},
};

/// One cell of the floor layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Tile {
    /// Not walkable and not drawn.
    #[default]
    Hole,
    Floor { frame: u16 },
}

/// Coarse draw layer. Every floor element draws before every object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Layer {
    Floor,
    Objects,
}

/// What a render entry stands for. Indices point into the board's object lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderKind {
    Floor { frame: u16 },
    FloorBorder,
    Stationary(usize),
    Moveable(usize),
    Agent,
}

impl RenderKind {
    pub fn layer(self) -> Layer {
        match self {
            RenderKind::Floor { .. } | RenderKind::FloorBorder => Layer::Floor,
            _ => Layer::Objects,
        }
    }
}

/// A visible element with its assigned draw position in the total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderItem {
    pub kind: RenderKind,
    pub position: GridPosition,
    pub z: u32,
    pub depth: usize,
}

/// The tile world of one level instance.
#[derive(Debug, Clone)]
pub struct Board {
    tile_width: u32,
    tile_height: u32,
    floor: Grid<Tile>,
    floor_created: bool,
    stationary: Vec<StationaryObject>,
    moveable: Vec<MoveableObject>,
    agent: Option<Agent>,
    render_order: Vec<RenderItem>,
}

impl Board {
    pub fn new(tile_width: u32, tile_height: u32) -> Self {
        Self {
            tile_width,
            tile_height,
            floor: Grid::new(0, 0),
            floor_created: false,
            stationary: Vec::new(),
            moveable: Vec::new(),
            agent: None,
            render_order: Vec::new(),
        }
    }

    /// Builds the floor from frame indices laid out `[row][col]`.
    ///
    /// Negative entries are holes. The board takes its width and height from
    /// the data; they cannot change until [`Board::clear`].
    pub fn create_floor(&mut self, frames: &[Vec<i32>]) -> Result<(), LevelError> {
        if self.floor_created {
            return Err(LevelError::FloorAlreadyCreated);
        }
        let height = frames.len();
        let width = frames.first().map_or(0, Vec::len);
        if width == 0 {
            return Err(LevelError::EmptyMap("board".to_string()));
        }
        for (row, cells) in frames.iter().enumerate() {
            if cells.len() != width {
                return Err(LevelError::RaggedMap {
                    row,
                    expected: width,
                    found: cells.len(),
                });
            }
        }

        self.floor = Grid::from_generator(width, height, |row, col| {
            match u16::try_from(frames[row][col]) {
                Ok(frame) => Tile::Floor { frame },
                Err(_) => Tile::Hole,
            }
        });
        self.floor_created = true;
        debug!(width, height, "floor created");
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.floor.width()
    }

    pub fn height(&self) -> usize {
        self.floor.height()
    }

    pub fn tile_size(&self) -> (u32, u32) {
        (self.tile_width, self.tile_height)
    }

    pub fn in_bounds(&self, pos: GridPosition) -> bool {
        self.floor.contains(pos.row, pos.col)
    }

    pub fn tile(&self, pos: GridPosition) -> Option<Tile> {
        self.floor.get(pos.row, pos.col).copied()
    }

    fn ensure_in_bounds(
        &self,
        what: impl Into<String>,
        pos: GridPosition,
    ) -> Result<(), LevelError> {
        if self.in_bounds(pos) {
            Ok(())
        } else {
            Err(LevelError::OutOfMap {
                what: what.into(),
                position: pos,
            })
        }
    }

    fn id_taken(&self, id: &ObjectId) -> bool {
        self.stationary.iter().any(|o| o.id() == Some(id))
            || self.moveable.iter().any(|o| o.id() == id)
    }

    pub fn add_stationary_object(
        &mut self,
        pos: GridPosition,
        config: StationaryConfig,
    ) -> Result<&StationaryObject, LevelError> {
        self.ensure_in_bounds(config.kind.clone(), pos)?;
        if let Some(id) = &config.id {
            if self.id_taken(id) {
                return Err(LevelError::DuplicateId(id.clone()));
            }
        }
        self.stationary.push(StationaryObject::new(pos, config));
        Ok(&self.stationary[self.stationary.len() - 1])
    }

    pub fn add_moveable_object(
        &mut self,
        pos: GridPosition,
        config: MoveableConfig,
    ) -> Result<&MoveableObject, LevelError> {
        self.ensure_in_bounds(config.id.to_string(), pos)?;
        if self.id_taken(&config.id) {
            return Err(LevelError::DuplicateId(config.id));
        }
        if let Some(existing) = self.moveable_at(pos) {
            return Err(LevelError::StackedBoxes {
                first: existing.id().clone(),
                second: config.id,
                position: pos,
            });
        }
        self.moveable.push(MoveableObject::new(pos, config));
        Ok(&self.moveable[self.moveable.len() - 1])
    }

    /// Places the single agent. The start cell must be walkable.
    pub fn place_agent(
        &mut self,
        pos: GridPosition,
        direction: Direction,
    ) -> Result<&Agent, LevelError> {
        self.ensure_in_bounds("agent", pos)?;
        if !self.is_walkable(pos) {
            return Err(LevelError::BlockedStart(pos));
        }
        Ok(self.agent.insert(Agent::new(pos, direction)))
    }

    pub fn agent(&self) -> Option<&Agent> {
        self.agent.as_ref()
    }

    pub(crate) fn agent_mut(&mut self) -> Option<&mut Agent> {
        self.agent.as_mut()
    }

    pub fn stationary_objects(&self) -> &[StationaryObject] {
        &self.stationary
    }

    pub fn moveable_objects(&self) -> &[MoveableObject] {
        &self.moveable
    }

    /// Attribute edits on a placed conveyor or obstacle.
    pub fn stationary_mut(&mut self, id: &ObjectId) -> Option<&mut StationaryObject> {
        self.stationary.iter_mut().find(|o| o.id() == Some(id))
    }

    pub fn stationary_by_id(&self, id: &ObjectId) -> Option<&StationaryObject> {
        self.stationary.iter().find(|o| o.id() == Some(id))
    }

    pub fn moveable_by_id(&self, id: &ObjectId) -> Option<&MoveableObject> {
        self.moveable.iter().find(|o| o.id() == id)
    }

    pub(crate) fn moveable_mut(&mut self, id: &ObjectId) -> Option<&mut MoveableObject> {
        self.moveable.iter_mut().find(|o| o.id() == id)
    }

    /// First stationary object registered at `pos`.
    pub fn stationary_at(&self, pos: GridPosition) -> Option<&StationaryObject> {
        self.stationary.iter().find(|o| o.position() == pos)
    }

    /// First uncarried moveable object registered at `pos`.
    pub fn moveable_at(&self, pos: GridPosition) -> Option<&MoveableObject> {
        self.moveable
            .iter()
            .find(|o| o.position() == pos && !o.is_carried())
    }

    /// Uncarried moveable objects, in registration order.
    pub fn resting_moveables(&self) -> impl Iterator<Item = &MoveableObject> {
        self.moveable.iter().filter(|o| !o.is_carried())
    }

    /// False for holes, cells off the board, and cells holding a collidable
    /// stationary or uncarried moveable object.
    pub fn is_walkable(&self, pos: GridPosition) -> bool {
        match self.tile(pos) {
            None | Some(Tile::Hole) => return false,
            Some(Tile::Floor { .. }) => {}
        }
        if self.stationary_at(pos).is_some_and(|o| o.is_collidable()) {
            return false;
        }
        if self.moveable_at(pos).is_some_and(|o| o.is_collidable()) {
            return false;
        }
        true
    }

    pub fn screen_position(&self, pos: GridPosition, z: u32) -> ScreenPoint {
        iso::grid_to_screen(
            pos.row as f64,
            pos.col as f64,
            self.tile_width as f64,
            self.tile_height as f64,
            z as f64,
        )
    }

    /// Hit-tests a screen point against the floor grid.
    pub fn cell_at_screen(&self, point: ScreenPoint) -> Option<GridPosition> {
        let (row, col) = iso::screen_to_grid(
            point.x,
            point.y,
            self.tile_width as f64,
            self.tile_height as f64,
        );
        let pos = GridPosition::new(usize::try_from(row).ok()?, usize::try_from(col).ok()?);
        self.in_bounds(pos).then_some(pos)
    }

    /// Recomputes the draw order of every visible element.
    ///
    /// Sort key: layer, then diagonal (`row + col`), then height. The sort is
    /// stable, so ties keep registration order. Carried items draw at the
    /// agent's cell, lifted by their carry offset.
    pub fn update_depth(&mut self) {
        let mut items = Vec::new();
        for (pos, tile) in self.floor.enumerate() {
            if let Tile::Floor { frame } = *tile {
                items.push((RenderKind::Floor { frame }, pos, 0));
                items.push((RenderKind::FloorBorder, pos, 0));
            }
        }
        for (i, obj) in self.stationary.iter().enumerate() {
            items.push((RenderKind::Stationary(i), obj.position(), obj.z_height()));
        }
        let agent = self.agent.as_ref();
        for (i, obj) in self.moveable.iter().enumerate() {
            let (pos, z) = match agent {
                Some(agent) if obj.is_carried() => (
                    agent.position(),
                    agent.z_height() + obj.carried_z_offset(),
                ),
                _ => (obj.position(), obj.z_height()),
            };
            items.push((RenderKind::Moveable(i), pos, z));
        }
        if let Some(agent) = agent {
            items.push((RenderKind::Agent, agent.position(), agent.z_height()));
        }

        items.sort_by_key(|(kind, pos, z)| (kind.layer(), pos.diagonal(), *z));
        self.render_order = items
            .into_iter()
            .enumerate()
            .map(|(depth, (kind, position, z))| RenderItem {
                kind,
                position,
                z,
                depth,
            })
            .collect();
    }

    /// Draw order as of the last [`Board::update_depth`].
    pub fn render_order(&self) -> &[RenderItem] {
        &self.render_order
    }

    /// Drops every tile, object and the agent. Safe to call repeatedly.
    pub fn clear(&mut self) {
        self.floor = Grid::new(0, 0);
        self.floor_created = false;
        self.stationary.clear();
        self.moveable.clear();
        self.agent = None;
        self.render_order.clear();
    }
}
