// Shared fixtures: a solver that answers from a script instead of solving.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskopt::domain::{Formulation, Result};
use taskopt::{Resource, SchedulingProblem, Solution, SolutionStatus, SolverConfig, SolverService, Task};

/// Returns a fixed status and the scripted value of each named variable
pub struct ScriptedSolver {
    status: SolutionStatus,
    values: HashMap<String, f64>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedSolver {
    pub fn returning(status: SolutionStatus) -> Self {
        Self {
            status,
            values: HashMap::new(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// An optimal answer; unlisted variables are zero.
    pub fn with_values(values: &[(&str, f64)]) -> Self {
        let mut solver = Self::returning(SolutionStatus::Optimal);
        solver.values = values.iter().map(|&(n, v)| (n.to_string(), v)).collect();
        solver
    }

    pub fn with_status(mut self, status: SolutionStatus) -> Self {
        self.status = status;
        self
    }

    /// Blocks the calling thread this long before answering.
    pub fn sleeping(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SolverService for ScriptedSolver {
    fn solve(&self, formulation: &Formulation, _config: &SolverConfig) -> Result<Solution> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.values.is_empty() {
            return Ok(Solution::new(self.status, "scripted"));
        }

        let values: Vec<f64> = formulation
            .variables
            .iter()
            .map(|v| self.values.get(&v.name).copied().unwrap_or(0.0))
            .collect();
        let objective = formulation.objective.evaluate(&values);
        Ok(Solution::with_values(self.status, objective, values))
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn supports_mip(&self) -> bool {
        true
    }
}

/// Tasks A (3) and B (4) on one exclusive machine
pub fn two_tasks() -> SchedulingProblem {
    SchedulingProblem::new(
        vec![Task::new("A", 3.0, "M"), Task::new("B", 4.0, "M")],
        vec![Resource::new("M")],
    )
    .unwrap()
}

/// A valid answer for [`two_tasks`]: A then B
pub fn a_then_b() -> ScriptedSolver {
    ScriptedSolver::with_values(&[
        ("start[A]", 0.0),
        ("start[B]", 3.0),
        ("order[A,B]", 1.0),
        ("makespan", 7.0),
    ])
}
