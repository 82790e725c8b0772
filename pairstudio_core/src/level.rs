//! Declarative level descriptions and their translation into a [`Board`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    Direction, GridPosition, ObjectId,
    board::Board,
    error::LevelError,
    object::{AttributeKey, Attributes, MoveableConfig, StationaryConfig},
    rules::{Medals, WinCondition},
    settings::Settings,
};

fn yes() -> bool {
    true
}

/// Tile indices laid out `[row][col]`. `0` is a hole and `1` is plain floor.
///
/// Values above `1` are also floor, drawn with frame `n - 1`, so a level can
/// vary its floor art. The built-in levels only use `0` and `1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapConfig {
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub height: Option<usize>,
    #[serde(default)]
    pub data: Vec<Vec<u16>>,
}

impl MapConfig {
    fn frames(&self) -> Vec<Vec<i32>> {
        self.data
            .iter()
            .map(|row| {
                row.iter()
                    .map(|&cell| if cell == 0 { -1 } else { i32::from(cell) - 1 })
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationaryPlacement {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<ObjectId>,
    pub row: usize,
    pub col: usize,
    #[serde(default)]
    pub collidable: Option<bool>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl StationaryPlacement {
    fn config(&self) -> StationaryConfig {
        let mut config = StationaryConfig::new(self.kind.clone());
        config.id = self.id.clone();
        if self.kind == "conveyor" {
            config.attributes.set(AttributeKey::AllowDrop, true);
        }
        for (key, value) in self.attributes.iter() {
            config.attributes.set(key.clone(), value.clone());
        }
        if let Some(collidable) = self.collidable {
            config.collidable = collidable;
        }
        config
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveablePlacement {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: ObjectId,
    pub row: usize,
    pub col: usize,
    #[serde(default)]
    pub collidable: Option<bool>,
    #[serde(default)]
    pub pickupable: Option<bool>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl MoveablePlacement {
    fn config(&self) -> MoveableConfig {
        let mut config = if self.kind == "box" {
            MoveableConfig::boxed(self.id.as_str())
        } else {
            MoveableConfig::new(self.kind.clone(), self.id.as_str())
        };
        config.attributes = self.attributes.clone();
        if let Some(collidable) = self.collidable {
            config.collidable = collidable;
        }
        if let Some(pickupable) = self.pickupable {
            config.pickupable = pickupable;
        }
        config
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectsConfig {
    #[serde(default)]
    pub stationary: Vec<StationaryPlacement>,
    #[serde(default)]
    pub moveable: Vec<MoveablePlacement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
    pub start_row: usize,
    pub start_col: usize,
    pub start_dir: Direction,
}

impl PlayerConfig {
    pub fn start(&self) -> GridPosition {
        GridPosition::new(self.start_row, self.start_col)
    }
}

/// Everything needed to build and judge one level. Unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: String,
    /// Tutorials set this to false.
    #[serde(default = "yes")]
    pub is_experiment: bool,
    #[serde(default = "yes")]
    pub chatbot_enabled: bool,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub objects: ObjectsConfig,
    pub player: PlayerConfig,
    #[serde(default)]
    pub win_conditions: Vec<WinCondition>,
    #[serde(default)]
    pub max_steps: Option<u32>,
    #[serde(default)]
    pub medals: Medals,
}

impl LevelConfig {
    pub fn from_json(json: &str) -> Result<Self, LevelError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks what can be checked without building a board.
    pub fn validate(&self) -> Result<(), LevelError> {
        if self.id.trim().is_empty() {
            return Err(LevelError::MissingId);
        }
        let height = self.map.data.len();
        let width = self.map.data.first().map_or(0, Vec::len);
        if width == 0 {
            return Err(LevelError::EmptyMap(self.id.clone()));
        }
        let ragged = self.map.data.iter().enumerate().find(|(_, r)| r.len() != width);
        if let Some((row, cells)) = ragged {
            return Err(LevelError::RaggedMap {
                row,
                expected: width,
                found: cells.len(),
            });
        }
        let declared_width = self.map.width.unwrap_or(width);
        let declared_height = self.map.height.unwrap_or(height);
        if (declared_width, declared_height) != (width, height) {
            return Err(LevelError::DimensionMismatch {
                declared_width,
                declared_height,
                width,
                height,
            });
        }
        if self.win_conditions.is_empty() {
            return Err(LevelError::NoWinConditions(self.id.clone()));
        }

        for condition in &self.win_conditions {
            let item = condition.item_id();
            if !self.objects.moveable.iter().any(|m| &m.id == item) {
                return Err(LevelError::UnknownReference {
                    kind: "item",
                    id: item.clone(),
                });
            }
            match condition {
                WinCondition::ItemAtPos { row, col, .. } => {
                    if *row >= height || *col >= width {
                        return Err(LevelError::OutOfMap {
                            what: format!("target of {item}"),
                            position: GridPosition::new(*row, *col),
                        });
                    }
                }
                WinCondition::ItemOnStationary { stationary_id, .. } => {
                    if !self
                        .objects
                        .stationary
                        .iter()
                        .any(|s| s.id.as_ref() == Some(stationary_id))
                    {
                        return Err(LevelError::UnknownReference {
                            kind: "stationary object",
                            id: stationary_id.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Validates the config and lays out a fresh board with the agent placed.
    pub fn build(&self, settings: &Settings) -> Result<Board, LevelError> {
        self.validate()?;
        let mut board = Board::new(settings.tile_width, settings.tile_height);
        board.create_floor(&self.map.frames())?;
        for placement in &self.objects.stationary {
            let at = GridPosition::new(placement.row, placement.col);
            board.add_stationary_object(at, placement.config())?;
        }
        for placement in &self.objects.moveable {
            let at = GridPosition::new(placement.row, placement.col);
            board.add_moveable_object(at, placement.config())?;
        }
        board.place_agent(self.player.start(), self.player.start_dir)?;
        board.update_depth();
        debug!(
            level = %self.id,
            stationary = self.objects.stationary.len(),
            moveable = self.objects.moveable.len(),
            "level built"
        );
        Ok(board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{board::Tile, object::GridObject};

    const SMALL: &str = r#"{
        "id": "small",
        "title": "Small",
        "allowedBlocks": {"actions": ["move_forward"]},
        "map": {"width": 3, "height": 2, "data": [[1, 1, 0], [1, 2, 1]]},
        "objects": {
            "stationary": [
                {"type": "conveyor", "row": 0, "col": 0, "id": "in",
                 "attributes": {"allowDrop": true}},
                {"type": "pillar", "row": 1, "col": 2}
            ],
            "moveable": [{"type": "box", "id": "b", "row": 0, "col": 0,
                          "attributes": {"itemType": "fragile"}}]
        },
        "player": {"startRow": 1, "startCol": 0, "startDir": 3},
        "winConditions": [{"type": "itemOnStationary", "itemId": "b", "stationaryId": "in"}],
        "maxSteps": 12
    }"#;

    fn small() -> LevelConfig {
        LevelConfig::from_json(SMALL).unwrap()
    }

    #[test]
    fn parses_metadata_with_defaults() {
        let level = small();
        assert_eq!(level.id, "small");
        assert!(level.is_experiment);
        assert!(level.chatbot_enabled);
        assert_eq!(level.max_steps, Some(12));
        assert_eq!(level.player.start_dir, Direction::North);
        assert_eq!(level.medals, Medals::default());
    }

    #[test]
    fn named_start_direction_is_accepted() {
        let json = SMALL.replace(r#""startDir": 3"#, r#""startDir": "east""#);
        let level = LevelConfig::from_json(&json).unwrap();
        assert_eq!(level.player.start_dir, Direction::East);
    }

    #[test]
    fn unknown_direction_is_rejected() {
        let json = SMALL.replace(r#""startDir": 3"#, r#""startDir": 9"#);
        assert!(matches!(LevelConfig::from_json(&json), Err(LevelError::Json(_))));
    }

    #[test]
    fn builds_board_from_config() {
        let board = small().build(&Settings::instant()).unwrap();
        assert_eq!((board.width(), board.height()), (3, 2));
        assert_eq!(board.tile(GridPosition::new(0, 2)), Some(Tile::Hole));
        assert_eq!(board.tile(GridPosition::new(1, 1)), Some(Tile::Floor { frame: 1 }));

        let conveyor = board.stationary_at(GridPosition::new(0, 0)).unwrap();
        assert!(conveyor.allows_drop());
        assert!(conveyor.is_collidable());
        let pillar = board.stationary_at(GridPosition::new(1, 2)).unwrap();
        assert!(!pillar.allows_drop());

        let item = board.moveable_by_id(&ObjectId::from("b")).unwrap();
        assert_eq!(item.z_height(), 12);
        assert_eq!(item.attributes().text(&AttributeKey::ItemType), Some("fragile"));

        let agent = board.agent().unwrap();
        assert_eq!(agent.position(), GridPosition::new(1, 0));
        assert!(!board.render_order().is_empty());
    }

    #[test]
    fn conveyor_without_explicit_flag_still_accepts_drops() {
        let json = SMALL.replace(r#""attributes": {"allowDrop": true}"#, r#""attributes": {}"#);
        let board = LevelConfig::from_json(&json).unwrap().build(&Settings::instant()).unwrap();
        assert!(board.stationary_at(GridPosition::new(0, 0)).unwrap().allows_drop());
    }

    #[test]
    fn validation_failures() {
        let mut level = small();
        level.id.clear();
        assert!(matches!(level.validate(), Err(LevelError::MissingId)));

        let mut level = small();
        level.map.data.clear();
        assert!(matches!(level.validate(), Err(LevelError::EmptyMap(_))));

        let mut level = small();
        level.map.data[1].pop();
        assert!(matches!(level.validate(), Err(LevelError::RaggedMap { row: 1, .. })));

        let mut level = small();
        level.map.width = Some(8);
        assert!(matches!(level.validate(), Err(LevelError::DimensionMismatch { .. })));

        let mut level = small();
        level.win_conditions.clear();
        assert!(matches!(level.validate(), Err(LevelError::NoWinConditions(_))));

        let mut level = small();
        level.win_conditions = vec![WinCondition::ItemAtPos {
            item_id: ObjectId::from("ghost"),
            row: 0,
            col: 0,
        }];
        assert!(matches!(level.validate(), Err(LevelError::UnknownReference { kind: "item", .. })));

        let mut level = small();
        level.win_conditions = vec![WinCondition::ItemAtPos {
            item_id: ObjectId::from("b"),
            row: 5,
            col: 0,
        }];
        assert!(matches!(level.validate(), Err(LevelError::OutOfMap { .. })));
    }

    #[test]
    fn agent_on_a_hole_cannot_start() {
        let mut level = small();
        level.player.start_row = 0;
        level.player.start_col = 2;
        assert!(matches!(
            level.build(&Settings::instant()),
            Err(LevelError::BlockedStart(_))
        ));
    }
}
