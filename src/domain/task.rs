// Tasks and resources: the raw inputs of a scheduling problem
//
// Times are plain numbers in caller-defined units relative to t = 0.

use serde::{Deserialize, Serialize};

/// Closed time interval `[from, to]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: f64,
    pub to: f64,
}

impl TimeWindow {
    pub fn new(from: f64, to: f64) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, start: f64, end: f64, epsilon: f64) -> bool {
        start >= self.from - epsilon && end <= self.to + epsilon
    }
}

/// Which resources may run a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceRequirement {
    /// Exactly this resource
    Resource(String),
    /// Any one of the listed resources
    AnyOf(Vec<String>),
    /// Any resource carrying this class label
    Class(String),
}

/// A unit of work to schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub duration: f64,
    pub requirement: ResourceRequirement,
    #[serde(default)]
    pub earliest_start: Option<f64>,
    /// Hard latest completion time
    #[serde(default)]
    pub deadline: Option<f64>,
    /// Soft completion target for tardiness and on-time objectives
    #[serde(default)]
    pub due_date: Option<f64>,
    /// Tardiness weight, or reward for finishing on time
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub predecessors: Vec<String>,
}

fn default_weight() -> f64 {
    1.0
}

impl Task {
    /// Creates a task that must run on `resource`.
    pub fn new(id: impl Into<String>, duration: f64, resource: impl Into<String>) -> Self {
        Self::with_requirement(id, duration, ResourceRequirement::Resource(resource.into()))
    }

    pub fn with_requirement(
        id: impl Into<String>,
        duration: f64,
        requirement: ResourceRequirement,
    ) -> Self {
        Self {
            id: id.into(),
            duration,
            requirement,
            earliest_start: None,
            deadline: None,
            due_date: None,
            weight: default_weight(),
            predecessors: Vec::new(),
        }
    }

    /// Allows the task on any of `resources`.
    pub fn on_any_of<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirement =
            ResourceRequirement::AnyOf(resources.into_iter().map(Into::into).collect());
        self
    }

    /// Allows the task on any resource of `class`.
    pub fn on_class(mut self, class: impl Into<String>) -> Self {
        self.requirement = ResourceRequirement::Class(class.into());
        self
    }

    pub fn with_earliest_start(mut self, time: f64) -> Self {
        self.earliest_start = Some(time);
        self
    }

    pub fn with_deadline(mut self, time: f64) -> Self {
        self.deadline = Some(time);
        self
    }

    pub fn with_due_date(mut self, time: f64) -> Self {
        self.due_date = Some(time);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_predecessor(mut self, id: impl Into<String>) -> Self {
        self.predecessors.push(id.into());
        self
    }

    /// Lower bound on the start time.
    pub fn release(&self) -> f64 {
        self.earliest_start.unwrap_or(0.0)
    }

    /// Due date used by soft objectives; falls back to the hard deadline.
    pub fn target(&self) -> Option<f64> {
        self.due_date.or(self.deadline)
    }
}

/// A machine, person or slot that runs tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    /// Number of tasks the resource may run at once
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub availability: Option<TimeWindow>,
}

fn default_capacity() -> u32 {
    1
}

impl Resource {
    /// Creates an exclusive (capacity 1) resource.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capacity: default_capacity(),
            class: None,
            availability: None,
        }
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn available_between(mut self, from: f64, to: f64) -> Self {
        self.availability = Some(TimeWindow::new(from, to));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_builder() {
        let task = Task::new("T1", 3.0, "M1")
            .with_earliest_start(2.0)
            .with_deadline(10.0)
            .with_weight(4.0)
            .with_predecessor("T0");

        assert_eq!(task.id, "T1");
        assert_eq!(task.release(), 2.0);
        assert_eq!(task.target(), Some(10.0));
        assert_eq!(task.predecessors, vec!["T0".to_string()]);
        assert_eq!(
            task.requirement,
            ResourceRequirement::Resource("M1".to_string())
        );
    }

    #[test]
    fn test_due_date_takes_precedence_over_deadline() {
        let task = Task::new("T1", 1.0, "M1")
            .with_deadline(10.0)
            .with_due_date(6.0);
        assert_eq!(task.target(), Some(6.0));
    }

    #[test]
    fn test_requirement_switch() {
        let task = Task::new("T1", 1.0, "M1").on_any_of(["M1", "M2"]);
        assert_eq!(
            task.requirement,
            ResourceRequirement::AnyOf(vec!["M1".into(), "M2".into()])
        );
        let task = task.on_class("lathe");
        assert_eq!(task.requirement, ResourceRequirement::Class("lathe".into()));
    }

    #[test]
    fn test_resource_defaults() {
        let r = Resource::new("M1");
        assert_eq!(r.capacity, 1);
        let r = r.with_capacity(3).available_between(0.0, 8.0);
        assert_eq!(r.capacity, 3);
        assert!(r.availability.unwrap().contains(0.0, 8.0, 1e-9));
        assert!(!r.availability.unwrap().contains(0.0, 8.5, 1e-9));
    }
}
