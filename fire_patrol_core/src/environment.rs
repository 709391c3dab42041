use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    Reward,
    agent::{AgentState, STUCK_REWARD},
    policy::{GreedyPolicy, Policy, apply},
};

/// Bounds that end a run early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLimits {
    /// `None` runs until the fires are out.
    pub max_ticks: Option<u64>,
    /// Consecutive stuck ticks tolerated before giving up.
    pub max_stuck_ticks: Option<u32>,
}

impl Default for RunLimits {
    fn default() -> Self {
        RunLimits {
            max_ticks: Some(10_000),
            max_stuck_ticks: Some(20),
        }
    }
}

/// Where a run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Extinguished,
    Stuck,
    TickLimit,
    Cancelled,
}

/// One row of the per-tick log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickRecord {
    pub iteration: u64,
    pub battery: u32,
    pub extinguisher_count: u32,
    pub fires_remaining: usize,
    pub reward: Reward,
}

/// End-of-run totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub iteration_count: u64,
    pub fire_count: usize,
    pub obstacle_count: usize,
    pub total_reward: i64,
    pub outcome: RunStatus,
}

/// Drives a single agent through ticks and keeps the run's bookkeeping.
pub struct Simulation {
    state: AgentState,
    policy: Box<dyn Policy>,
    limits: RunLimits,
    fire_count: usize,
    obstacle_count: usize,
    iteration_count: u64,
    total_reward: i64,
    stuck_ticks: u32,
    status: RunStatus,
}

impl Simulation {
    /// Creates a run driven by the greedy policy.
    pub fn new(state: AgentState, limits: RunLimits) -> Self {
        Self::with_policy(state, Box::new(GreedyPolicy::new()), limits)
    }

    pub fn with_policy(state: AgentState, policy: Box<dyn Policy>, limits: RunLimits) -> Self {
        let fire_count = state.fires.len() + state.extinguished.len();
        let obstacle_count = state.map.obstacles().count();
        let mut simulation = Simulation {
            state,
            policy,
            limits,
            fire_count,
            obstacle_count,
            iteration_count: 0,
            total_reward: 0,
            stuck_ticks: 0,
            status: RunStatus::Running,
        };
        simulation.refresh_status();
        simulation
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_finished(&self) -> bool {
        self.status != RunStatus::Running
    }

    pub fn iteration_count(&self) -> u64 {
        self.iteration_count
    }

    /// Performs one tick. Returns `None` once the run is over.
    pub fn step(&mut self) -> Option<TickRecord> {
        if self.is_finished() {
            return None;
        }

        let action = self.policy.choose_action(&self.state);
        let reward = apply(&mut self.state, action);

        self.iteration_count += 1;
        self.total_reward += i64::from(reward);
        if reward == STUCK_REWARD {
            self.stuck_ticks += 1;
            warn!(
                iteration = self.iteration_count,
                consecutive = self.stuck_ticks,
                "agent is stuck"
            );
        } else {
            self.stuck_ticks = 0;
        }
        self.refresh_status();

        Some(TickRecord {
            iteration: self.iteration_count,
            battery: self.state.battery_level,
            extinguisher_count: self.state.extinguisher_count,
            fires_remaining: self.state.fires.len(),
            reward,
        })
    }

    /// Stops the run between ticks.
    pub fn cancel(&mut self) {
        if !self.is_finished() {
            self.status = RunStatus::Cancelled;
            info!(iteration = self.iteration_count, "run cancelled");
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            iteration_count: self.iteration_count,
            fire_count: self.fire_count,
            obstacle_count: self.obstacle_count,
            total_reward: self.total_reward,
            outcome: self.status,
        }
    }

    fn refresh_status(&mut self) {
        let status = if self.state.fires.is_empty() {
            RunStatus::Extinguished
        } else if self
            .limits
            .max_stuck_ticks
            .is_some_and(|limit| self.stuck_ticks >= limit)
        {
            RunStatus::Stuck
        } else if self
            .limits
            .max_ticks
            .is_some_and(|limit| self.iteration_count >= limit)
        {
            RunStatus::TickLimit
        } else {
            RunStatus::Running
        };

        if status != RunStatus::Running {
            info!(
                ?status,
                iterations = self.iteration_count,
                total_reward = self.total_reward,
                "run finished"
            );
        }
        self.status = status;
    }
}
