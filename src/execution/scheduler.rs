//! Execution scheduler - determines which steps to run next

use crate::core::{ExecutionStatus, Pipeline};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Strategy for scheduling step execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// Execute steps in dependency order, one at a time
    #[default]
    Sequential,

    /// Execute all ready steps in parallel
    Parallel,

    /// Limited parallelism (max N concurrent steps)
    LimitedParallel(usize),
}

/// Runtime view of which steps are active and how far each has got.
///
/// Top-level steps are active from the start. Branch steps become active only
/// when their condition node selects their arm, so steps in the other arm are
/// never scheduled.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    order: Vec<String>,
    dependencies: HashMap<String, BTreeSet<String>>,
    active: HashSet<String>,
    status: HashMap<String, ExecutionStatus>,
}

impl ExecutionPlan {
    pub fn new(pipeline: &Pipeline) -> Self {
        let dependencies = pipeline
            .scoped_steps()
            .iter()
            .map(|s| (s.step.name.clone(), s.dependencies()))
            .collect();
        let active = pipeline.steps().iter().map(|s| s.name.clone()).collect();

        Self {
            order: pipeline.execution_order().to_vec(),
            dependencies,
            active,
            status: HashMap::new(),
        }
    }

    /// Make steps eligible for scheduling
    pub fn activate<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active.extend(names.into_iter().map(Into::into));
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains(name)
    }

    pub fn set_status(&mut self, name: &str, status: ExecutionStatus) {
        self.status.insert(name.to_string(), status);
    }

    pub fn status(&self, name: &str) -> ExecutionStatus {
        self.status.get(name).copied().unwrap_or(ExecutionStatus::Pending)
    }

    /// Active pending steps whose dependencies all succeeded, in execution order
    pub fn ready_steps(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| self.is_active(name) && self.status(name) == ExecutionStatus::Pending)
            .filter(|name| {
                self.dependencies
                    .get(name.as_str())
                    .map(|deps| deps.iter().all(|d| self.status(d) == ExecutionStatus::Succeeded))
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    pub fn running_count(&self) -> usize {
        self.status
            .values()
            .filter(|s| **s == ExecutionStatus::Executing)
            .count()
    }
}

/// Scheduler for determining which steps to run
pub struct ExecutionScheduler {
    strategy: SchedulingStrategy,
}

impl ExecutionScheduler {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Get the next batch of steps to start
    pub fn next_steps(&self, plan: &ExecutionPlan) -> Vec<String> {
        let ready = plan.ready_steps();
        let running = plan.running_count();

        match self.strategy {
            SchedulingStrategy::Sequential => {
                if running > 0 {
                    vec![]
                } else {
                    ready.into_iter().take(1).collect()
                }
            }
            SchedulingStrategy::Parallel => ready,
            SchedulingStrategy::LimitedParallel(max) => {
                let remaining = max.max(1).saturating_sub(running);
                ready.into_iter().take(remaining).collect()
            }
        }
    }
}
