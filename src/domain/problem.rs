// Validated scheduling problem.
//
// A `SchedulingProblem` can only be obtained through validation, so every
// downstream component (model builder, interpreter) may rely on:
// - unique task and resource ids,
// - positive finite durations and capacities ≥ 1,
// - every requirement resolving to at least one known resource,
// - every predecessor naming a known task,
// - an acyclic precedence graph (checked with Kahn's topological sort).

use super::task::{Resource, ResourceRequirement, Task};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Errors raised while constructing a problem. None of these reach a solver.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProblemError {
    #[error("Duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },

    #[error("Task '{task}' has invalid duration {duration}")]
    InvalidDuration { task: String, duration: f64 },

    #[error("Resource '{resource}' has invalid capacity {capacity}")]
    InvalidCapacity { resource: String, capacity: u32 },

    #[error("Invalid time value for {owner} ({field} = {value})")]
    InvalidTime {
        owner: String,
        field: &'static str,
        value: f64,
    },

    #[error("Task '{task}' references unknown resource '{resource}'")]
    UnknownResource { task: String, resource: String },

    #[error("Task '{task}' has no eligible resources")]
    EmptyRequirement { task: String },

    #[error("Task '{task}' references unknown predecessor '{predecessor}'")]
    UnknownPredecessor { task: String, predecessor: String },

    #[error("Cyclic precedence among tasks: {}", tasks.join(", "))]
    CyclicPrecedence { tasks: Vec<String> },
}

/// Serializable, not yet validated description of a problem
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemDescription {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    /// Explicit upper bound on every end time
    #[serde(default)]
    pub horizon: Option<f64>,
}

/// A validated, immutable set of tasks and resources
#[derive(Debug, Clone)]
pub struct SchedulingProblem {
    tasks: Vec<Task>,
    resources: Vec<Resource>,
    horizon: Option<f64>,
    task_index: HashMap<String, usize>,
    resource_index: HashMap<String, usize>,
    eligible: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
    topological_order: Vec<usize>,
}

impl SchedulingProblem {
    pub fn new(tasks: Vec<Task>, resources: Vec<Resource>) -> Result<Self, ProblemError> {
        Self::build(tasks, resources, None)
    }

    /// Same as [`SchedulingProblem::new`] with an explicit horizon.
    pub fn with_horizon(
        tasks: Vec<Task>,
        resources: Vec<Resource>,
        horizon: f64,
    ) -> Result<Self, ProblemError> {
        Self::build(tasks, resources, Some(horizon))
    }

    fn build(
        tasks: Vec<Task>,
        resources: Vec<Resource>,
        horizon: Option<f64>,
    ) -> Result<Self, ProblemError> {
        let resource_index = index_resources(&resources)?;
        let task_index = index_tasks(&tasks)?;

        let eligible = tasks
            .iter()
            .map(|task| resolve_requirement(task, &resources, &resource_index))
            .collect::<Result<Vec<_>, _>>()?;

        let mut predecessors = Vec::with_capacity(tasks.len());
        for task in &tasks {
            let mut preds = Vec::with_capacity(task.predecessors.len());
            for pred in &task.predecessors {
                let &p = task_index
                    .get(pred)
                    .ok_or_else(|| ProblemError::UnknownPredecessor {
                        task: task.id.clone(),
                        predecessor: pred.clone(),
                    })?;
                if !preds.contains(&p) {
                    preds.push(p);
                }
            }
            predecessors.push(preds);
        }

        let topological_order = topological_sort(&tasks, &predecessors)?;

        Ok(Self {
            tasks,
            resources,
            horizon,
            task_index,
            resource_index,
            eligible,
            predecessors,
            topological_order,
        })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn horizon(&self) -> Option<f64> {
        self.horizon
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task(&self, index: usize) -> &Task {
        &self.tasks[index]
    }

    pub fn resource(&self, index: usize) -> &Resource {
        &self.resources[index]
    }

    pub fn task_index(&self, id: &str) -> Option<usize> {
        self.task_index.get(id).copied()
    }

    pub fn resource_index(&self, id: &str) -> Option<usize> {
        self.resource_index.get(id).copied()
    }

    /// Indices of the resources that may run task `index`, in resource order
    pub fn eligible_resources(&self, index: usize) -> &[usize] {
        &self.eligible[index]
    }

    /// Indices of the direct predecessors of task `index`
    pub fn predecessors(&self, index: usize) -> &[usize] {
        &self.predecessors[index]
    }

    /// Task indices in an order where every predecessor comes first
    pub fn topological_order(&self) -> &[usize] {
        &self.topological_order
    }

    /// All precedence edges as `(predecessor, successor)` task indices
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.predecessors
            .iter()
            .enumerate()
            .flat_map(|(succ, preds)| preds.iter().map(move |&pred| (pred, succ)))
    }

    /// Indices of the tasks that may run on resource `index`
    pub fn tasks_eligible_for(&self, resource: usize) -> Vec<usize> {
        (0..self.tasks.len())
            .filter(|&t| self.eligible[t].contains(&resource))
            .collect()
    }

    /// `reach[u][v]` is true when `u` must finish before `v` starts, directly or transitively
    pub fn precedence_closure(&self) -> Vec<Vec<bool>> {
        let n = self.tasks.len();
        let mut reach = vec![vec![false; n]; n];
        for &v in &self.topological_order {
            for &u in &self.predecessors[v] {
                reach[u][v] = true;
                for w in 0..n {
                    if reach[w][u] {
                        reach[w][v] = true;
                    }
                }
            }
        }
        reach
    }
}

impl TryFrom<ProblemDescription> for SchedulingProblem {
    type Error = ProblemError;

    fn try_from(description: ProblemDescription) -> Result<Self, Self::Error> {
        Self::build(
            description.tasks,
            description.resources,
            description.horizon,
        )
    }
}

fn check_time(owner: &str, field: &'static str, value: Option<f64>) -> Result<(), ProblemError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(ProblemError::InvalidTime {
            owner: owner.to_string(),
            field,
            value: v,
        }),
        _ => Ok(()),
    }
}

fn index_resources(resources: &[Resource]) -> Result<HashMap<String, usize>, ProblemError> {
    let mut index = HashMap::with_capacity(resources.len());
    for (i, r) in resources.iter().enumerate() {
        if index.insert(r.id.clone(), i).is_some() {
            return Err(ProblemError::DuplicateId {
                kind: "resource",
                id: r.id.clone(),
            });
        }
        if r.capacity == 0 {
            return Err(ProblemError::InvalidCapacity {
                resource: r.id.clone(),
                capacity: r.capacity,
            });
        }
        if let Some(window) = r.availability {
            let owner = format!("resource '{}'", r.id);
            check_time(&owner, "availability.from", Some(window.from))?;
            check_time(&owner, "availability.to", Some(window.to))?;
            if window.to < window.from {
                return Err(ProblemError::InvalidTime {
                    owner,
                    field: "availability.to",
                    value: window.to,
                });
            }
        }
    }
    Ok(index)
}

fn index_tasks(tasks: &[Task]) -> Result<HashMap<String, usize>, ProblemError> {
    let mut index = HashMap::with_capacity(tasks.len());
    for (i, task) in tasks.iter().enumerate() {
        if index.insert(task.id.clone(), i).is_some() {
            return Err(ProblemError::DuplicateId {
                kind: "task",
                id: task.id.clone(),
            });
        }
        if !task.duration.is_finite() || task.duration <= 0.0 {
            return Err(ProblemError::InvalidDuration {
                task: task.id.clone(),
                duration: task.duration,
            });
        }
        let owner = format!("task '{}'", task.id);
        check_time(&owner, "earliest_start", task.earliest_start)?;
        check_time(&owner, "deadline", task.deadline)?;
        check_time(&owner, "due_date", task.due_date)?;
        check_time(&owner, "weight", Some(task.weight))?;
    }
    Ok(index)
}

fn resolve_requirement(
    task: &Task,
    resources: &[Resource],
    index: &HashMap<String, usize>,
) -> Result<Vec<usize>, ProblemError> {
    let lookup = |id: &String| {
        index
            .get(id)
            .copied()
            .ok_or_else(|| ProblemError::UnknownResource {
                task: task.id.clone(),
                resource: id.clone(),
            })
    };

    let mut eligible = match &task.requirement {
        ResourceRequirement::Resource(id) => vec![lookup(id)?],
        ResourceRequirement::AnyOf(ids) => {
            if ids.is_empty() {
                return Err(ProblemError::EmptyRequirement {
                    task: task.id.clone(),
                });
            }
            ids.iter().map(lookup).collect::<Result<Vec<_>, _>>()?
        }
        ResourceRequirement::Class(class) => {
            let matching: Vec<usize> = resources
                .iter()
                .enumerate()
                .filter(|(_, r)| r.class.as_deref() == Some(class.as_str()))
                .map(|(i, _)| i)
                .collect();
            if matching.is_empty() {
                return Err(ProblemError::UnknownResource {
                    task: task.id.clone(),
                    resource: format!("class:{}", class),
                });
            }
            matching
        }
    };

    eligible.sort_unstable();
    eligible.dedup();
    Ok(eligible)
}

/// Kahn's algorithm. Ties are broken by task index so the order is deterministic.
fn topological_sort(tasks: &[Task], predecessors: &[Vec<usize>]) -> Result<Vec<usize>, ProblemError> {
    let n = tasks.len();
    let mut in_degree: Vec<usize> = predecessors.iter().map(Vec::len).collect();
    let mut successors = vec![Vec::new(); n];
    for (succ, preds) in predecessors.iter().enumerate() {
        for &pred in preds {
            successors[pred].push(succ);
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(node) = queue.pop_front() {
        order.push(node);
        for &succ in &successors[node] {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                queue.push_back(succ);
            }
        }
    }

    if order.len() < n {
        let sorted: HashSet<usize> = order.into_iter().collect();
        let tasks = (0..n)
            .filter(|i| !sorted.contains(i))
            .map(|i| tasks[i].id.clone())
            .collect();
        return Err(ProblemError::CyclicPrecedence { tasks });
    }

    Ok(order)
}
