//! 2:1 isometric projection between grid cells and screen space.
//!
//! Screen `x` grows to the right and `y` grows downwards. A cell's screen point
//! is the centre of its floor diamond; `z` lifts a point straight up.

use serde::{Deserialize, Serialize};

/// A point in screen (pixel) space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

/// Projects `(row, col)` at height `z` onto the screen.
///
/// `x = (col - row) * tile_width / 2`, `y = (col + row) * tile_height / 2 - z`.
pub fn grid_to_screen(
    row: f64,
    col: f64,
    tile_width: f64,
    tile_height: f64,
    z: f64,
) -> ScreenPoint {
    ScreenPoint {
        x: (col - row) * (tile_width / 2.0),
        y: (col + row) * (tile_height / 2.0) - z,
    }
}

/// Inverse of [`grid_to_screen`] at `z = 0`, floored to whole cells.
///
/// The result may be negative or past the board edge; callers bounds-check.
pub fn screen_to_grid(x: f64, y: f64, tile_width: f64, tile_height: f64) -> (i64, i64) {
    let half_w = x / (tile_width / 2.0);
    let half_h = y / (tile_height / 2.0);
    let col = (half_w + half_h) / 2.0;
    let row = (half_h - half_w) / 2.0;
    (row.floor() as i64, col.floor() as i64)
}
