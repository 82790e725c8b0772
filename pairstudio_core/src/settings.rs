use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long each visual action takes before the next one may start.
///
/// The engine awaits these durations in place of tween callbacks, so a
/// zeroed `Timing` runs a whole program without real-time delays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// One tile of movement.
    pub move_ms: u64,
    /// A quarter turn (squash and release).
    pub turn_ms: u64,
    /// Lifting an item onto the agent.
    pub pick_ms: u64,
    /// Snapping to a named direction.
    pub face_ms: u64,
    /// Pause between the steps of a multi-step move.
    pub step_gap_ms: u64,
    /// Wait after a drop before the level is evaluated.
    pub settle_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            move_ms: 400,
            turn_ms: 200,
            pick_ms: 300,
            face_ms: 100,
            step_gap_ms: 100,
            settle_ms: 300,
        }
    }
}

impl Timing {
    pub fn instant() -> Self {
        Self {
            move_ms: 0,
            turn_ms: 0,
            pick_ms: 0,
            face_ms: 0,
            step_gap_ms: 0,
            settle_ms: 0,
        }
    }
}

/// Sleeps for `ms` milliseconds; zero returns immediately.
pub(crate) async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Board geometry and pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tile_width: u32,
    pub tile_height: u32,
    pub timing: Timing,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tile_width: 64,
            tile_height: 32,
            timing: Timing::default(),
        }
    }
}

impl Settings {
    /// Settings for tests and headless checks: default geometry, no delays.
    pub fn instant() -> Self {
        Self {
            timing: Timing::instant(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
