use super::models::SolverStatistics;
use super::value_objects::SolutionStatus;
use serde::{Deserialize, Serialize};

/// One task placed on one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub task_id: String,
    pub resource_id: String,
    pub start: f64,
    pub end: f64,
    /// Whether the task finishes by its due date; `None` when it has none
    pub on_time: Option<bool>,
    /// Lateness past the due date, zero when on time or without a due date
    pub tardiness: f64,
}

/// A decoded and validated schedule, one entry per task in problem order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub status: SolutionStatus,
    pub entries: Vec<ScheduleEntry>,
    pub objective_value: Option<f64>,
    pub total_reward: f64,
    pub weighted_tardiness: f64,
    pub statistics: SolverStatistics,
}

impl Schedule {
    /// The schedule of a problem without tasks.
    pub fn empty() -> Self {
        Self {
            status: SolutionStatus::Optimal,
            entries: Vec::new(),
            objective_value: Some(0.0),
            total_reward: 0.0,
            weighted_tardiness: 0.0,
            statistics: SolverStatistics::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, task_id: &str) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|e| e.task_id == task_id)
    }

    /// Completion time of the last task
    pub fn makespan(&self) -> f64 {
        self.entries.iter().map(|e| e.end).fold(0.0, f64::max)
    }

    pub fn is_optimal(&self) -> bool {
        self.status == SolutionStatus::Optimal
    }

    /// Entries of one resource, sorted by start time
    pub fn entries_on(&self, resource_id: &str) -> Vec<&ScheduleEntry> {
        let mut entries: Vec<&ScheduleEntry> = self
            .entries
            .iter()
            .filter(|e| e.resource_id == resource_id)
            .collect();
        entries.sort_by(|a, b| a.start.total_cmp(&b.start));
        entries
    }
}
