use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{GRID_SIZE, Position};

/// At most half of the field may hold fires and obstacles together.
pub const MAX_OCCUPIED_CELLS: usize = GRID_SIZE * GRID_SIZE / 2;

/// Obstacles keep this squared Euclidean distance from the base (radius 2).
const MIN_OBSTACLE_DISTANCE_SQUARED: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScenarioError {
    #[error(
        "{fires} fires and {obstacles} obstacles exceed the limit of {limit} occupied cells"
    )]
    TooManyCells {
        fires: usize,
        obstacles: usize,
        limit: usize,
    },
    #[error("Base ({x}, {y}) is outside the grid")]
    BaseOutOfBounds { x: usize, y: usize },
    #[error("{0}")]
    Parse(String),
}

/// Initial placement of fires and obstacles for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub fires: Vec<Position>,
    pub obstacles: Vec<Position>,
    /// Obstacles requested but not placed because too few cells were far enough from the base.
    pub shortfall: usize,
}

/// Rejects fire/obstacle counts that would occupy more than half of the grid.
pub fn validate_counts(fire_count: usize, obstacle_count: usize) -> Result<(), ScenarioError> {
    match fire_count.checked_add(obstacle_count) {
        Some(total) if total <= MAX_OCCUPIED_CELLS => Ok(()),
        _ => Err(ScenarioError::TooManyCells {
            fires: fire_count,
            obstacles: obstacle_count,
            limit: MAX_OCCUPIED_CELLS,
        }),
    }
}

/// Draws a random placement: `fire_count` fires anywhere except the base, then
/// up to `obstacle_count` obstacles among the remaining cells at distance >= 2
/// from the base.
///
/// When the constrained pool runs dry, fewer obstacles are returned and the
/// missing amount is recorded in [`Scenario::shortfall`].
pub fn generate_positions<R: Rng + ?Sized>(
    rng: &mut R,
    fire_count: usize,
    obstacle_count: usize,
    base: Position,
) -> Result<Scenario, ScenarioError> {
    validate_counts(fire_count, obstacle_count)?;
    if base.x >= GRID_SIZE || base.y >= GRID_SIZE {
        return Err(ScenarioError::BaseOutOfBounds {
            x: base.x,
            y: base.y,
        });
    }

    let mut pool: Vec<Position> = (0..GRID_SIZE)
        .flat_map(|x| (0..GRID_SIZE).map(move |y| Position::new(x, y)))
        .filter(|cell| *cell != base)
        .collect();
    pool.shuffle(rng);

    let remaining = pool.split_off(fire_count);
    let fires = pool;

    let mut candidates = remaining;
    candidates.shuffle(rng);
    let obstacles: Vec<Position> = candidates
        .into_iter()
        .filter(|cell| cell.squared_distance(&base) >= MIN_OBSTACLE_DISTANCE_SQUARED)
        .take(obstacle_count)
        .collect();

    let shortfall = obstacle_count - obstacles.len();
    if shortfall > 0 {
        warn!(
            requested = obstacle_count,
            placed = obstacles.len(),
            "not enough cells away from the base for all obstacles"
        );
    }

    Ok(Scenario {
        fires,
        obstacles,
        shortfall,
    })
}

/// Loads a scenario from a whitespace-separated token map, one row per line.
///
/// Tokens: `BL` blank, `FI` fire, `OB` obstacle, `BA` base (exactly one).
pub fn load_scenario_from_string(map_string: &str) -> Result<(Scenario, Position), ScenarioError> {
    let lines: Vec<&str> = map_string.trim().lines().collect();
    if lines.len() != GRID_SIZE {
        return Err(ScenarioError::Parse(format!(
            "Map must have {} rows, found {}",
            GRID_SIZE,
            lines.len()
        )));
    }

    let mut scenario = Scenario::default();
    let mut base: Option<Position> = None;

    for (y, line) in lines.iter().enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != GRID_SIZE {
            return Err(ScenarioError::Parse(format!(
                "Inconsistent width at row {}: expected {}, found {}",
                y,
                GRID_SIZE,
                tokens.len()
            )));
        }
        for (x, token) in tokens.iter().enumerate() {
            let pos = Position::new(x, y);
            match *token {
                "BL" => {}
                "FI" => scenario.fires.push(pos),
                "OB" => scenario.obstacles.push(pos),
                "BA" => {
                    if base.is_some() {
                        return Err(ScenarioError::Parse(
                            "Multiple base positions ('BA') found.".to_string(),
                        ));
                    }
                    base = Some(pos);
                }
                unknown => {
                    return Err(ScenarioError::Parse(format!(
                        "Unknown map code '{}' at position ({}, {}).",
                        unknown, x, y
                    )));
                }
            }
        }
    }

    let base = base.ok_or_else(|| ScenarioError::Parse("No base ('BA') found in map.".to_string()))?;
    validate_counts(scenario.fires.len(), scenario.obstacles.len())?;
    Ok((scenario, base))
}
