use crate::{error::LevelError, level::LevelConfig};

const BUILTIN: [&str; 8] = [
    include_str!("../levels/tutorial_A.json"),
    include_str!("../levels/tutorial_B.json"),
    include_str!("../levels/tutorial_C.json"),
    include_str!("../levels/level_001.json"),
    include_str!("../levels/level_002.json"),
    include_str!("../levels/level_003.json"),
    include_str!("../levels/level_004.json"),
    include_str!("../levels/level_005.json"),
];

/// An ordered set of levels. The order is the default progression.
#[derive(Debug, Clone, Default)]
pub struct LevelCatalog {
    levels: Vec<LevelConfig>,
}

impl LevelCatalog {
    /// Tutorials first, then the numbered levels.
    pub fn builtin() -> Result<Self, LevelError> {
        let levels = BUILTIN
            .iter()
            .map(|json| LevelConfig::from_json(json))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(levels)
    }

    /// Validates every level up front.
    pub fn new(levels: Vec<LevelConfig>) -> Result<Self, LevelError> {
        for level in &levels {
            level.validate()?;
        }
        Ok(Self { levels })
    }

    pub fn get(&self, id: &str) -> Option<&LevelConfig> {
        self.levels.iter().find(|l| l.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.levels.iter().map(|l| l.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// The level after `id`, or `None` at the end or for an unknown id.
    pub fn next_after(&self, id: &str) -> Option<&LevelConfig> {
        let index = self.levels.iter().position(|l| l.id == id)?;
        self.levels.get(index + 1)
    }
}
