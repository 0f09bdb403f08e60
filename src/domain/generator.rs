// Random single-machine instances: integer durations, due dates and rewards

use super::problem::{ProblemError, SchedulingProblem};
use super::task::{Resource, Task};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Name of the single machine every generated task runs on
pub const GENERATED_MACHINE: &str = "machine";

/// Parameters of the random generator, all bounds inclusive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskGenerator {
    pub num_tasks: usize,
    pub min_duration: u32,
    pub max_duration: u32,
    pub min_due_date: u32,
    pub max_due_date: u32,
    pub min_reward: u32,
    pub max_reward: u32,
}

impl Default for TaskGenerator {
    fn default() -> Self {
        Self {
            num_tasks: 10,
            min_duration: 1,
            max_duration: 10,
            min_due_date: 5,
            max_due_date: 30,
            min_reward: 10,
            max_reward: 100,
        }
    }
}

impl TaskGenerator {
    pub fn new(num_tasks: usize) -> Self {
        Self {
            num_tasks,
            ..Self::default()
        }
    }

    pub fn with_durations(mut self, min: u32, max: u32) -> Self {
        self.min_duration = min.max(1);
        self.max_duration = max.max(self.min_duration);
        self
    }

    pub fn with_due_dates(mut self, min: u32, max: u32) -> Self {
        self.min_due_date = min;
        self.max_due_date = max.max(min);
        self
    }

    pub fn with_rewards(mut self, min: u32, max: u32) -> Self {
        self.min_reward = min;
        self.max_reward = max.max(min);
        self
    }

    /// Generates tasks `T0..Tn` with the given RNG.
    pub fn tasks<R: Rng>(&self, rng: &mut R) -> Vec<Task> {
        let durations = self.min_duration.max(1)..=self.max_duration.max(self.min_duration.max(1));
        let due_dates = self.min_due_date..=self.max_due_date.max(self.min_due_date);
        let rewards = self.min_reward..=self.max_reward.max(self.min_reward);
        (0..self.num_tasks)
            .map(|i| {
                let duration = rng.random_range(durations.clone());
                let due = rng.random_range(due_dates.clone());
                let reward = rng.random_range(rewards.clone());
                Task::new(format!("T{}", i), duration as f64, GENERATED_MACHINE)
                    .with_due_date(due as f64)
                    .with_weight(reward as f64)
            })
            .collect()
    }

    /// Generates a reproducible problem on one exclusive machine.
    pub fn problem(&self, seed: u64) -> Result<SchedulingProblem, ProblemError> {
        let mut rng = StdRng::seed_from_u64(seed);
        SchedulingProblem::new(self.tasks(&mut rng), vec![Resource::new(GENERATED_MACHINE)])
    }
}
