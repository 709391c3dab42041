use serde::{Deserialize, Serialize};

use crate::{
    Reward,
    agent::{AgentState, LOW_BATTERY},
};

/// Actions the agent can take in a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Extinguish,
    Recharge,
    MoveTowardFire,
}

/// Trait defining how an action is picked for the current state.
pub trait Policy {
    /// Determines the action to perform. Must not mutate the state.
    fn choose_action(&mut self, state: &AgentState) -> Action;
}

/// A guard and the action it selects when it holds.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub guard: fn(&AgentState) -> bool,
    pub action: Action,
}

fn can_extinguish(state: &AgentState) -> bool {
    state.on_fire() && state.extinguisher_count > 0
}

fn needs_recharge(state: &AgentState) -> bool {
    state.battery_level < LOW_BATTERY || state.extinguisher_count == 0
}

fn has_fires(state: &AgentState) -> bool {
    !state.fires.is_empty()
}

fn always(_: &AgentState) -> bool {
    true
}

/// Priority chain of the greedy patrol, first matching guard wins.
pub static GREEDY_RULES: [Rule; 4] = [
    Rule {
        name: "extinguish",
        guard: can_extinguish,
        action: Action::Extinguish,
    },
    Rule {
        name: "low-resources",
        guard: needs_recharge,
        action: Action::Recharge,
    },
    Rule {
        name: "seek-fire",
        guard: has_fires,
        action: Action::MoveTowardFire,
    },
    Rule {
        name: "idle",
        guard: always,
        action: Action::Recharge,
    },
];

/// Fixed-priority rule evaluator.
#[derive(Debug, Clone)]
pub struct GreedyPolicy {
    rules: &'static [Rule],
}

impl GreedyPolicy {
    pub fn new() -> Self {
        GreedyPolicy {
            rules: &GREEDY_RULES,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        self.rules
    }
}

impl Default for GreedyPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for GreedyPolicy {
    fn choose_action(&mut self, state: &AgentState) -> Action {
        self.rules
            .iter()
            .find(|rule| (rule.guard)(state))
            .map(|rule| rule.action)
            .unwrap_or(Action::Recharge)
    }
}

/// Executes `action` against `state` and returns its reward.
pub fn apply(state: &mut AgentState, action: Action) -> Reward {
    match action {
        Action::Extinguish => state.extinguish(),
        Action::Recharge => state.recharge(),
        Action::MoveTowardFire => state.move_toward_fire(),
    }
}

/// Advances the state by one greedy action.
///
/// Callers stop ticking once `state.fires` is empty.
pub fn tick(state: &mut AgentState) -> Reward {
    let action = GreedyPolicy::new().choose_action(state);
    apply(state, action)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{
        GRID_SIZE, Position,
        agent::{
            BASE, EXTINGUISH_REWARD, MAX_BATTERY, MOVE_REWARD, RECHARGE_REWARD, new_agent,
        },
    };

    fn p(x: usize, y: usize) -> Position {
        Position::new(x, y)
    }

    #[test]
    fn rule_order_is_extinguish_first() {
        let names: Vec<&str> = GreedyPolicy::new().rules().iter().map(|r| r.name).collect();
        assert_eq!(names, ["extinguish", "low-resources", "seek-fire", "idle"]);
    }

    #[test]
    fn chooses_extinguish_on_fire_with_charge() {
        let mut state = new_agent([BASE], []).unwrap();
        state.battery_level = 0;
        assert_eq!(GreedyPolicy::new().choose_action(&state), Action::Extinguish);
        assert_eq!(tick(&mut state), EXTINGUISH_REWARD);
        assert_eq!(state.extinguisher_count, 0);
        assert!(state.fires.is_empty());
    }

    #[test]
    fn empty_tank_on_fire_falls_through_to_recharge() {
        let mut state = new_agent([p(3, 3)], []).unwrap();
        state.position = p(3, 3);
        state.extinguisher_count = 0;
        assert_eq!(GreedyPolicy::new().choose_action(&state), Action::Recharge);
    }

    #[test]
    fn low_battery_heads_home() {
        let mut state = new_agent([p(3, 3)], []).unwrap();
        state.position = p(0, 8);
        state.battery_level = 5;
        assert_eq!(GreedyPolicy::new().choose_action(&state), Action::Recharge);
        tick(&mut state);
        assert_eq!(state.position, BASE);
        assert_eq!(tick(&mut state), RECHARGE_REWARD);
        assert_eq!(state.battery_level, MAX_BATTERY);
        assert_eq!(state.extinguisher_count, 1);
    }

    #[test]
    fn no_fires_means_idle_recharge() {
        let state = new_agent([], []).unwrap();
        assert_eq!(GreedyPolicy::new().choose_action(&state), Action::Recharge);
    }

    #[test]
    fn single_far_fire_scenario() {
        let fire = p(9, 0);
        let mut state = new_agent([fire], []).unwrap();

        let mut moves = 0;
        let mut total = 0;
        while state.position != fire {
            let reward = tick(&mut state);
            assert_eq!(reward, MOVE_REWARD);
            moves += 1;
            total += reward;
        }
        assert_eq!(moves, 18);
        assert_eq!(state.battery_level, 10);

        total += tick(&mut state);
        assert!(state.fires.is_empty());
        assert!(state.extinguished.contains(&fire));
        assert_eq!(total, 18 + EXTINGUISH_REWARD);
    }

    fn cells(max: usize) -> impl Strategy<Value = Vec<(usize, usize)>> {
        proptest::collection::vec((0..GRID_SIZE, 0..GRID_SIZE), 0..max)
    }

    proptest! {
        #[test]
        fn tick_stays_on_passable_cells(
            obstacle_cells in cells(30),
            fire_cells in cells(8),
            ticks in 1usize..200,
        ) {
            let obstacles: Vec<Position> = obstacle_cells
                .into_iter()
                .map(|(x, y)| p(x, y))
                .filter(|c| *c != BASE)
                .collect();
            let fires: Vec<Position> = fire_cells
                .into_iter()
                .map(|(x, y)| p(x, y))
                .filter(|c| !obstacles.contains(c))
                .collect();
            let mut state = new_agent(fires, obstacles).unwrap();

            for _ in 0..ticks {
                if state.fires.is_empty() {
                    break;
                }
                let before = state.fires.len();
                tick(&mut state);
                prop_assert!(state.map.is_passable(state.position));
                prop_assert!(state.battery_level <= MAX_BATTERY);
                prop_assert!(state.extinguisher_count <= 1);
                prop_assert!(state.fires.len() <= before);
                prop_assert!(state.fires.is_disjoint(&state.extinguished));
            }
        }
    }
}
