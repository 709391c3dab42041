use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    GRID_SIZE, Position, Reward,
    map::{GridError, GridMap},
    pathfinding::{Path, find_path},
};

/// Fixed base location: bottom-left corner of the field.
pub const BASE: Position = Position::new(0, GRID_SIZE - 1);
pub const MAX_BATTERY: u32 = 100;
pub const MAX_EXTINGUISHER: u32 = 1;
/// Battery spent per step.
pub const MOVE_COST: u32 = 5;
/// Below this level the agent heads home.
pub const LOW_BATTERY: u32 = 10;

pub const EXTINGUISH_REWARD: Reward = 10;
pub const FAILED_EXTINGUISH_REWARD: Reward = -5;
pub const MOVE_REWARD: Reward = 1;
pub const RETURN_REWARD: Reward = -1;
pub const RECHARGE_REWARD: Reward = 0;
pub const STUCK_REWARD: Reward = -3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Map(#[from] GridError),
    #[error("Fire at ({x}, {y}) is outside the grid")]
    FireOutOfBounds { x: usize, y: usize },
    #[error("Fire at ({x}, {y}) overlaps an obstacle")]
    FireOnObstacle { x: usize, y: usize },
}

/// Mutable simulation state of the single patrolling agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub map: GridMap,
    pub position: Position,
    pub battery_level: u32,
    pub extinguisher_count: u32,
    pub fires: HashSet<Position>,
    pub extinguished: HashSet<Position>,
    /// `(manhattan distance, fire)` sorted ascending; derived from `position` and `fires`.
    distances_to_fires: Vec<(usize, Position)>,
}

/// Creates an agent at the base with a full battery and a full tank.
pub fn new_agent<F, O>(fire_cells: F, obstacle_cells: O) -> Result<AgentState, AgentError>
where
    F: IntoIterator<Item = Position>,
    O: IntoIterator<Item = Position>,
{
    let map = GridMap::new(obstacle_cells, BASE)?;
    AgentState::new(map, fire_cells)
}

impl AgentState {
    /// Creates an agent on `map`'s base. Fires must be passable cells.
    pub fn new<F>(map: GridMap, fire_cells: F) -> Result<Self, AgentError>
    where
        F: IntoIterator<Item = Position>,
    {
        let mut fires = HashSet::new();
        for fire in fire_cells {
            if !map.contains(fire) {
                return Err(AgentError::FireOutOfBounds {
                    x: fire.x,
                    y: fire.y,
                });
            }
            if map.is_obstacle(fire) {
                return Err(AgentError::FireOnObstacle {
                    x: fire.x,
                    y: fire.y,
                });
            }
            fires.insert(fire);
        }

        let mut state = AgentState {
            position: map.base(),
            map,
            battery_level: MAX_BATTERY,
            extinguisher_count: MAX_EXTINGUISHER,
            fires,
            extinguished: HashSet::new(),
            distances_to_fires: Vec::new(),
        };
        state.update_distances_to_fires();
        Ok(state)
    }

    pub fn at_base(&self) -> bool {
        self.position == self.map.base()
    }

    pub fn on_fire(&self) -> bool {
        self.fires.contains(&self.position)
    }

    /// Remaining fires with their Manhattan distance, nearest first.
    pub fn distances_to_fires(&self) -> &[(usize, Position)] {
        &self.distances_to_fires
    }

    pub fn nearest_fire(&self) -> Option<Position> {
        self.distances_to_fires.first().map(|(_, fire)| *fire)
    }

    /// Shortest path from the current position to `goal`.
    pub fn find_path(&self, goal: Position) -> Option<Path> {
        find_path(&self.map, self.position, goal)
    }

    fn update_distances_to_fires(&mut self) {
        let position = self.position;
        self.distances_to_fires = self
            .fires
            .iter()
            .map(|fire| (position.manhattan_distance(fire), *fire))
            .collect();
        self.distances_to_fires.sort_unstable();
    }

    fn step_to(&mut self, next: Position) {
        debug_assert!(self.map.is_passable(next));
        self.position = next;
        self.battery_level = self.battery_level.saturating_sub(MOVE_COST);
        self.update_distances_to_fires();
    }

    /// Puts out the fire under the agent.
    ///
    /// Costs one extinguisher charge. Invoked off a fire or with an empty tank it
    /// changes nothing and yields `FAILED_EXTINGUISH_REWARD`.
    pub fn extinguish(&mut self) -> Reward {
        if self.extinguisher_count == 0 || !self.fires.remove(&self.position) {
            debug!(position = ?self.position, "extinguish rejected");
            return FAILED_EXTINGUISH_REWARD;
        }
        self.extinguisher_count -= 1;
        self.extinguished.insert(self.position);
        self.update_distances_to_fires();
        debug!(position = ?self.position, remaining = self.fires.len(), "fire extinguished");
        EXTINGUISH_REWARD
    }

    /// Refills at the base, otherwise takes one step home.
    pub fn recharge(&mut self) -> Reward {
        if self.at_base() {
            self.battery_level = MAX_BATTERY;
            self.extinguisher_count = MAX_EXTINGUISHER;
            debug!("recharged at base");
            return RECHARGE_REWARD;
        }
        match self.find_path(self.map.base()).and_then(|p| p.first().copied()) {
            Some(next) => {
                self.step_to(next);
                debug!(position = ?next, battery = self.battery_level, "returning to base");
                RETURN_REWARD
            }
            None => {
                warn!(position = ?self.position, "no path back to base");
                STUCK_REWARD
            }
        }
    }

    /// Advances one step toward the nearest fire, if the battery covers the
    /// whole path. Falls back to [`AgentState::recharge`] otherwise.
    pub fn move_toward_fire(&mut self) -> Reward {
        if self.battery_level < LOW_BATTERY {
            return self.recharge();
        }
        let step = self
            .nearest_fire()
            .and_then(|target| self.find_path(target))
            .filter(|path| self.can_afford(path))
            .and_then(|path| path.first().copied());
        match step {
            Some(next) => {
                self.step_to(next);
                debug!(position = ?next, battery = self.battery_level, "moving toward fire");
                MOVE_REWARD
            }
            None => self.recharge(),
        }
    }

    fn can_afford(&self, path: &Path) -> bool {
        u32::try_from(path.len())
            .ok()
            .and_then(|steps| steps.checked_mul(MOVE_COST))
            .is_some_and(|cost| self.battery_level >= cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: usize, y: usize) -> Position {
        Position::new(x, y)
    }

    #[test]
    fn new_agent_starts_at_base_fully_charged() {
        let state = new_agent([p(3, 3), p(1, 9), p(3, 3)], [p(5, 5)]).unwrap();
        assert_eq!(state.position, BASE);
        assert_eq!(state.battery_level, MAX_BATTERY);
        assert_eq!(state.extinguisher_count, 1);
        assert_eq!(state.fires.len(), 2);
        assert!(state.extinguished.is_empty());
        assert_eq!(state.distances_to_fires(), &[(1, p(1, 9)), (9, p(3, 3))]);
    }

    #[test]
    fn new_agent_rejects_invalid_cells() {
        assert_eq!(
            new_agent([p(5, 5)], [p(5, 5)]).unwrap_err(),
            AgentError::FireOnObstacle { x: 5, y: 5 }
        );
        assert_eq!(
            new_agent([p(0, 10)], []).unwrap_err(),
            AgentError::FireOutOfBounds { x: 0, y: 10 }
        );
        assert!(matches!(
            new_agent([], [BASE]),
            Err(AgentError::Map(GridError::ObstacleOnBase { .. }))
        ));
    }

    #[test]
    fn extinguish_removes_exactly_one_fire() {
        let mut state = new_agent([BASE, p(4, 4)], []).unwrap();
        assert_eq!(state.extinguish(), EXTINGUISH_REWARD);
        assert_eq!(state.extinguisher_count, 0);
        assert_eq!(state.fires, HashSet::from([p(4, 4)]));
        assert!(state.extinguished.contains(&BASE));
        assert_eq!(state.distances_to_fires(), &[(9, p(4, 4))]);
    }

    #[test]
    fn extinguish_without_preconditions_is_penalised() {
        let mut state = new_agent([p(4, 4)], []).unwrap();
        assert_eq!(state.extinguish(), FAILED_EXTINGUISH_REWARD);
        assert_eq!(state.extinguisher_count, 1);

        let mut empty_tank = new_agent([BASE], []).unwrap();
        empty_tank.extinguisher_count = 0;
        assert_eq!(empty_tank.extinguish(), FAILED_EXTINGUISH_REWARD);
        assert!(empty_tank.fires.contains(&BASE));
    }

    #[test]
    fn recharge_at_base_restores_everything() {
        let mut state = new_agent([p(4, 4)], []).unwrap();
        state.battery_level = 5;
        state.extinguisher_count = 0;
        assert_eq!(state.recharge(), RECHARGE_REWARD);
        assert_eq!(state.battery_level, MAX_BATTERY);
        assert_eq!(state.extinguisher_count, MAX_EXTINGUISHER);
        assert_eq!(state.position, BASE);
    }

    #[test]
    fn recharge_away_from_base_steps_home() {
        let mut state = new_agent([p(4, 4)], []).unwrap();
        state.position = p(0, 7);
        state.battery_level = 20;
        assert_eq!(state.recharge(), RETURN_REWARD);
        assert_eq!(state.position, p(0, 8));
        assert_eq!(state.battery_level, 15);
    }

    #[test]
    fn battery_never_underflows() {
        let mut state = new_agent([], []).unwrap();
        state.position = p(0, 7);
        state.battery_level = 0;
        assert_eq!(state.recharge(), RETURN_REWARD);
        assert_eq!(state.battery_level, 0);
    }

    #[test]
    fn enclosed_agent_is_stuck() {
        let ring = [p(4, 5), p(6, 5), p(5, 4), p(5, 6)];
        let mut state = new_agent([p(1, 1)], ring).unwrap();
        state.position = p(5, 5);
        state.battery_level = 40;
        assert_eq!(state.recharge(), STUCK_REWARD);
        assert_eq!(state.position, p(5, 5));
        assert_eq!(state.battery_level, 40);
        // The fire is out of reach too, so moving degrades to the same outcome.
        assert_eq!(state.move_toward_fire(), STUCK_REWARD);
    }

    #[test]
    fn move_steps_toward_nearest_fire() {
        let mut state = new_agent([p(0, 6), p(9, 0)], []).unwrap();
        assert_eq!(state.move_toward_fire(), MOVE_REWARD);
        assert_eq!(state.position, p(0, 8));
        assert_eq!(state.battery_level, 95);
        assert_eq!(state.nearest_fire(), Some(p(0, 6)));
        assert_eq!(state.distances_to_fires()[0].0, 2);
    }

    #[test]
    fn unaffordable_path_falls_back_to_recharge() {
        let mut state = new_agent([p(9, 0)], []).unwrap();
        state.position = p(0, 8);
        state.battery_level = 50;
        // 17 steps would cost 85.
        assert_eq!(state.move_toward_fire(), RETURN_REWARD);
        assert_eq!(state.position, BASE);
    }
}
