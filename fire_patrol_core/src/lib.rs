use serde::{Deserialize, Serialize};

pub mod agent;
pub mod environment;
pub mod map;
pub mod pathfinding;
pub mod policy;
pub mod scenario;

/// Side length of the square playing field.
pub const GRID_SIZE: usize = 10;

/// Reward emitted by a single tick.
pub type Reward = i32;

/// Represents a 2D coordinate (a grid cell).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Position { x, y }
    }

    /// Manhattan distance, `|dx| + |dy|`.
    pub fn manhattan_distance(&self, other: &Position) -> usize {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Squared Euclidean distance, avoiding floating point for radius checks.
    pub fn squared_distance(&self, other: &Position) -> usize {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        dx * dx + dy * dy
    }
}
