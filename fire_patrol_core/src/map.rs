use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::{GRID_SIZE, Position};

/// Represents errors that can occur when building a map.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Coordinates ({x}, {y}) are out of bounds for grid size ({width}, {height})")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
    #[error("Base at ({x}, {y}) cannot be an obstacle")]
    ObstacleOnBase { x: usize, y: usize },
}

/// A generic 2D grid structure.
///
/// Stores elements of type `T` in a flat vector using row-major order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, filled with `value`.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn filled(width: usize, height: usize, value: T) -> Self
    where
        T: Clone,
    {
        let size = width.checked_mul(height).expect("Grid size overflow");
        Grid {
            width,
            height,
            cells: vec![value; size],
        }
    }

    /// Returns the width of the grid.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the height of the grid.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn index_of(&self, position: Position) -> Option<usize> {
        if self.contains(position) {
            Some(position.y * self.width + position.x)
        } else {
            None
        }
    }

    /// Checks if the given position lies within the grid boundaries.
    #[inline]
    pub fn contains(&self, position: Position) -> bool {
        position.x < self.width && position.y < self.height
    }

    /// Gets an immutable reference to the cell at `position`, or `None` when out of bounds.
    pub fn get(&self, position: Position) -> Option<&T> {
        self.index_of(position).map(|index| &self.cells[index])
    }

    /// Sets the value of the cell at `position`.
    pub fn set(&mut self, position: Position, value: T) -> Result<(), GridError> {
        let index = self.index_of(position).ok_or(GridError::OutOfBounds {
            x: position.x,
            y: position.y,
            width: self.width,
            height: self.height,
        })?;
        self.cells[index] = value;
        Ok(())
    }

    /// Returns an iterator that yields `(Position, &T)` for each cell in row-major order.
    pub fn enumerate(&self) -> impl Iterator<Item = (Position, &T)> {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .map(move |(index, cell)| (Position::new(index % width, index / width), cell))
    }
}

impl<T> Index<Position> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, position: Position) -> &Self::Output {
        match self.index_of(position) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                position.x, position.y, self.width, self.height
            ),
        }
    }
}

impl<T> IndexMut<Position> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, position: Position) -> &mut Self::Output {
        let (width, height) = (self.width, self.height);
        match self.index_of(position) {
            Some(idx) => &mut self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                position.x, position.y, width, height
            ),
        }
    }
}

/// The static playing field: a fixed-size obstacle layer and the base cell.
///
/// The base is never an obstacle and the map never changes after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridMap {
    obstacles: Grid<bool>,
    base: Position,
}

impl GridMap {
    /// Builds a `GRID_SIZE` x `GRID_SIZE` map from a list of obstacle cells.
    pub fn new<I>(obstacles: I, base: Position) -> Result<Self, GridError>
    where
        I: IntoIterator<Item = Position>,
    {
        let mut layer = Grid::filled(GRID_SIZE, GRID_SIZE, false);
        if !layer.contains(base) {
            return Err(GridError::OutOfBounds {
                x: base.x,
                y: base.y,
                width: GRID_SIZE,
                height: GRID_SIZE,
            });
        }
        for obstacle in obstacles {
            if obstacle == base {
                return Err(GridError::ObstacleOnBase {
                    x: base.x,
                    y: base.y,
                });
            }
            layer.set(obstacle, true)?;
        }
        Ok(GridMap {
            obstacles: layer,
            base,
        })
    }

    pub fn base(&self) -> Position {
        self.base
    }

    pub fn width(&self) -> usize {
        self.obstacles.width()
    }

    pub fn height(&self) -> usize {
        self.obstacles.height()
    }

    pub fn contains(&self, position: Position) -> bool {
        self.obstacles.contains(position)
    }

    pub fn is_obstacle(&self, position: Position) -> bool {
        self.obstacles.get(position).copied().unwrap_or(false)
    }

    /// A cell the agent may occupy: in bounds and not an obstacle.
    pub fn is_passable(&self, position: Position) -> bool {
        matches!(self.obstacles.get(position), Some(false))
    }

    /// Obstacle cells in row-major order.
    pub fn obstacles(&self) -> impl Iterator<Item = Position> + '_ {
        self.obstacles
            .enumerate()
            .filter_map(|(position, blocked)| blocked.then_some(position))
    }

    /// Passable 4-connected neighbours of `position`, in left, right, up, down order.
    pub fn neighbors(&self, position: Position) -> Vec<Position> {
        const DIRECTIONS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

        let mut neighbors = Vec::with_capacity(DIRECTIONS.len());
        for (dx, dy) in DIRECTIONS {
            let Some(x) = position.x.checked_add_signed(dx) else {
                continue;
            };
            let Some(y) = position.y.checked_add_signed(dy) else {
                continue;
            };
            let neighbor = Position::new(x, y);
            if self.is_passable(neighbor) {
                neighbors.push(neighbor);
            }
        }
        neighbors
    }
}
