//! Occupants of the board: conveyors, boxes and the capability set they share.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{GridPosition, ObjectId};

/// Well-known attribute names, with an escape hatch for level-specific tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AttributeKey {
    /// Items may be dropped onto this stationary object without failing the level.
    AllowDrop,
    /// The conveyor a box is meant to be delivered to.
    TargetConveyorId,
    /// Free-form category of a box ("fragile", "blue", ...).
    ItemType,
    Other(String),
}

impl AttributeKey {
    pub fn as_str(&self) -> &str {
        match self {
            AttributeKey::AllowDrop => "allowDrop",
            AttributeKey::TargetConveyorId => "targetConveyorId",
            AttributeKey::ItemType => "itemType",
            AttributeKey::Other(name) => name,
        }
    }
}

impl From<&str> for AttributeKey {
    fn from(name: &str) -> Self {
        match name {
            "allowDrop" => AttributeKey::AllowDrop,
            // older level files spell it `targetId`
            "targetConveyorId" | "targetId" => AttributeKey::TargetConveyorId,
            "itemType" => AttributeKey::ItemType,
            other => AttributeKey::Other(other.to_string()),
        }
    }
}

impl From<String> for AttributeKey {
    fn from(name: String) -> Self {
        AttributeKey::from(name.as_str())
    }
}

impl From<AttributeKey> for String {
    fn from(key: AttributeKey) -> Self {
        key.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Text(v.to_string())
    }
}

/// Per-object metadata. Writes are unchecked and the last write wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<AttributeKey, AttributeValue>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &AttributeKey) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    /// Looks an attribute up by its spelled-out name.
    pub fn get_named(&self, name: &str) -> Option<&AttributeValue> {
        self.0.get(&AttributeKey::from(name))
    }

    pub fn set(&mut self, key: AttributeKey, value: impl Into<AttributeValue>) {
        self.0.insert(key, value.into());
    }

    /// True only for an explicit boolean `true`.
    pub fn flag(&self, key: &AttributeKey) -> bool {
        matches!(self.get(key), Some(AttributeValue::Bool(true)))
    }

    pub fn text(&self, key: &AttributeKey) -> Option<&str> {
        match self.get(key) {
            Some(AttributeValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn allows_drop(&self) -> bool {
        self.flag(&AttributeKey::AllowDrop)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttributeKey, &AttributeValue)> {
        self.0.iter()
    }
}

/// Capabilities shared by everything placed on the board.
///
/// Positions are read-only here: only the board and the agent controller move
/// things, through crate-private setters.
pub trait GridObject {
    fn position(&self) -> GridPosition;
    fn is_collidable(&self) -> bool;
    fn z_height(&self) -> u32;
    fn attributes(&self) -> &Attributes;
    fn attributes_mut(&mut self) -> &mut Attributes;

    fn attribute(&self, key: &AttributeKey) -> Option<&AttributeValue> {
        self.attributes().get(key)
    }

    fn set_attribute(&mut self, key: AttributeKey, value: AttributeValue) {
        self.attributes_mut().set(key, value);
    }
}

fn yes() -> bool {
    true
}

fn default_moveable_z() -> u32 {
    10
}

fn default_carried_z_offset() -> u32 {
    20
}

/// Placement options for a stationary object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationaryConfig {
    pub kind: String,
    #[serde(default)]
    pub id: Option<ObjectId>,
    #[serde(default = "yes")]
    pub collidable: bool,
    #[serde(default)]
    pub z_height: u32,
    #[serde(default)]
    pub attributes: Attributes,
}

impl StationaryConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            collidable: true,
            z_height: 0,
            attributes: Attributes::new(),
        }
    }

    /// A collidable conveyor that accepts dropped items.
    pub fn conveyor(id: impl Into<String>) -> Self {
        let mut config = Self::new("conveyor");
        config.id = Some(ObjectId(id.into()));
        config.attributes.set(AttributeKey::AllowDrop, true);
        config
    }

    pub fn with_collidable(mut self, collidable: bool) -> Self {
        self.collidable = collidable;
        self
    }
}

/// Placement options for a moveable object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveableConfig {
    pub kind: String,
    pub id: ObjectId,
    #[serde(default = "yes")]
    pub collidable: bool,
    #[serde(default = "default_moveable_z")]
    pub z_height: u32,
    #[serde(default = "default_carried_z_offset")]
    pub carried_z_offset: u32,
    #[serde(default = "yes")]
    pub pickupable: bool,
    #[serde(default)]
    pub attributes: Attributes,
}

impl MoveableConfig {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: ObjectId(id.into()),
            collidable: true,
            z_height: default_moveable_z(),
            carried_z_offset: default_carried_z_offset(),
            pickupable: true,
            attributes: Attributes::new(),
        }
    }

    pub fn boxed(id: impl Into<String>) -> Self {
        let mut config = Self::new("box", id);
        config.z_height = 12;
        config
    }
}

/// Something that stays put once placed, such as a conveyor.
#[derive(Debug, Clone, PartialEq)]
pub struct StationaryObject {
    position: GridPosition,
    kind: String,
    id: Option<ObjectId>,
    collidable: bool,
    z_height: u32,
    attributes: Attributes,
}

impl StationaryObject {
    pub(crate) fn new(position: GridPosition, config: StationaryConfig) -> Self {
        Self {
            position,
            kind: config.kind,
            id: config.id,
            collidable: config.collidable,
            z_height: config.z_height,
            attributes: config.attributes,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> Option<&ObjectId> {
        self.id.as_ref()
    }

    pub fn allows_drop(&self) -> bool {
        self.attributes.allows_drop()
    }
}

impl GridObject for StationaryObject {
    fn position(&self) -> GridPosition {
        self.position
    }
    fn is_collidable(&self) -> bool {
        self.collidable
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

/// A box or other item the agent can pick up and carry.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveableObject {
    pub(crate) position: GridPosition,
    pub(crate) carried: bool,
    kind: String,
    id: ObjectId,
    collidable: bool,
    z_height: u32,
    carried_z_offset: u32,
    pickupable: bool,
    attributes: Attributes,
}

impl MoveableObject {
    pub(crate) fn new(position: GridPosition, config: MoveableConfig) -> Self {
        Self {
            position,
            carried: false,
            kind: config.kind,
            id: config.id,
            collidable: config.collidable,
            z_height: config.z_height,
            carried_z_offset: config.carried_z_offset,
            pickupable: config.pickupable,
            attributes: config.attributes,
        }
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn is_carried(&self) -> bool {
        self.carried
    }

    pub fn is_pickupable(&self) -> bool {
        self.pickupable
    }

    /// Extra height above the carrier while being carried.
    pub fn carried_z_offset(&self) -> u32 {
        self.carried_z_offset
    }
}

impl GridObject for MoveableObject {
    fn position(&self) -> GridPosition {
        self.position
    }
    fn is_collidable(&self) -> bool {
        self.collidable
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
