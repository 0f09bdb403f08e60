// Decodes solver output into a `Schedule` and re-checks it against the problem.
//
// The checks run against the `SchedulingProblem`, never against the
// formulation, so a formulation bug or solver rounding beyond `epsilon`
// surfaces as a `ValidationError` instead of an unusable schedule. Values
// are reported as the solver returned them; nothing is clamped or repaired.

use crate::application::model_builder::{Assignment, ScheduleModel};
use crate::domain::{Schedule, ScheduleEntry, SchedulingProblem, Solution};
use std::collections::HashMap;
use std::fmt;

/// The constraint a schedule failed
#[derive(Debug, Clone, PartialEq)]
pub enum ViolatedConstraint {
    /// The solution carries no usable value for this task
    Unscheduled { task: String },
    /// The task appears more than once
    DuplicateEntry { task: String },
    /// Zero or several assignment binaries are set
    AmbiguousAssignment { task: String },
    Duration { task: String },
    EarliestStart { task: String },
    Deadline { task: String },
    Eligibility { task: String, resource: String },
    ResourceWindow { task: String, resource: String },
    Precedence { predecessor: String, successor: String },
    Capacity { resource: String, at: f64 },
}

impl fmt::Display for ViolatedConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolatedConstraint::Unscheduled { task } => write!(f, "task '{}' unscheduled", task),
            ViolatedConstraint::DuplicateEntry { task } => {
                write!(f, "task '{}' scheduled more than once", task)
            }
            ViolatedConstraint::AmbiguousAssignment { task } => {
                write!(f, "task '{}' has no single resource assignment", task)
            }
            ViolatedConstraint::Duration { task } => write!(f, "duration of task '{}'", task),
            ViolatedConstraint::EarliestStart { task } => {
                write!(f, "earliest start of task '{}'", task)
            }
            ViolatedConstraint::Deadline { task } => write!(f, "deadline of task '{}'", task),
            ViolatedConstraint::Eligibility { task, resource } => {
                write!(f, "task '{}' is not eligible for resource '{}'", task, resource)
            }
            ViolatedConstraint::ResourceWindow { task, resource } => write!(
                f,
                "availability of resource '{}' for task '{}'",
                resource, task
            ),
            ViolatedConstraint::Precedence {
                predecessor,
                successor,
            } => write!(f, "precedence '{}' -> '{}'", predecessor, successor),
            ViolatedConstraint::Capacity { resource, at } => {
                write!(f, "capacity of resource '{}' at t={}", resource, at)
            }
        }
    }
}

/// A decoded schedule broke a constraint of the problem by more than epsilon
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Schedule violates {violated_constraint} (magnitude {magnitude})")]
pub struct ValidationError {
    pub violated_constraint: ViolatedConstraint,
    pub magnitude: f64,
}

impl ValidationError {
    fn new(violated_constraint: ViolatedConstraint, magnitude: f64) -> Self {
        Self {
            violated_constraint,
            magnitude,
        }
    }
}

/// Turns a [`Solution`] of a [`ScheduleModel`] into a validated [`Schedule`]
#[derive(Debug, Clone, Copy)]
pub struct SolutionInterpreter {
    epsilon: f64,
}

impl Default for SolutionInterpreter {
    fn default() -> Self {
        Self { epsilon: 1e-6 }
    }
}

impl SolutionInterpreter {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn interpret(
        &self,
        problem: &SchedulingProblem,
        model: &ScheduleModel,
        solution: &Solution,
    ) -> Result<Schedule, ValidationError> {
        let values = &solution.variable_values;
        let mut entries = Vec::with_capacity(problem.len());
        let mut total_reward = 0.0;
        let mut weighted_tardiness = 0.0;

        for (t, task) in problem.tasks().iter().enumerate() {
            let vars = model.task_variables(t);
            let start = match values.get(vars.start) {
                Some(&x) if x.is_finite() => x,
                _ => {
                    return Err(ValidationError::new(
                        ViolatedConstraint::Unscheduled {
                            task: task.id.clone(),
                        },
                        f64::INFINITY,
                    ))
                }
            };

            let lane = match &vars.assignment {
                Assignment::Fixed(lane) => *lane,
                Assignment::Choice(options) => {
                    let selected: Vec<usize> = options
                        .iter()
                        .filter(|&&(_, var)| values.get(var).is_some_and(|&x| x > 0.5))
                        .map(|&(lane, _)| lane)
                        .collect();
                    if selected.len() != 1 {
                        return Err(ValidationError::new(
                            ViolatedConstraint::AmbiguousAssignment {
                                task: task.id.clone(),
                            },
                            (selected.len() as f64 - 1.0).abs(),
                        ));
                    }
                    selected[0]
                }
            };

            let end = start + task.duration;
            let lateness = task.target().map(|due| end - due);
            let on_time = lateness.map(|late| late <= self.epsilon);
            let tardiness = lateness.filter(|&late| late > self.epsilon).unwrap_or(0.0);
            if on_time == Some(true) {
                total_reward += task.weight;
            }
            weighted_tardiness += task.weight * tardiness;

            entries.push(ScheduleEntry {
                task_id: task.id.clone(),
                resource_id: problem.resource(model.lane(lane).resource).id.clone(),
                start,
                end,
                on_time,
                tardiness,
            });
        }

        let schedule = Schedule {
            status: solution.status,
            entries,
            objective_value: solution.objective_value,
            total_reward,
            weighted_tardiness,
            statistics: solution.statistics.clone(),
        };

        validate_schedule(problem, &schedule, self.epsilon)?;
        Ok(schedule)
    }
}

/// Checks every constraint of `problem` against `schedule`, tolerating `epsilon`.
///
/// Returns the first violation found, in this order: coverage, per-task
/// timing and eligibility, precedence, capacity.
pub fn validate_schedule(
    problem: &SchedulingProblem,
    schedule: &Schedule,
    epsilon: f64,
) -> Result<(), ValidationError> {
    let mut by_task: HashMap<&str, &ScheduleEntry> = HashMap::with_capacity(schedule.len());
    for entry in &schedule.entries {
        if by_task.insert(entry.task_id.as_str(), entry).is_some() {
            return Err(ValidationError::new(
                ViolatedConstraint::DuplicateEntry {
                    task: entry.task_id.clone(),
                },
                1.0,
            ));
        }
    }

    let mut placed = Vec::with_capacity(problem.len());
    for task in problem.tasks() {
        let entry = by_task.get(task.id.as_str()).copied().ok_or_else(|| {
            ValidationError::new(
                ViolatedConstraint::Unscheduled {
                    task: task.id.clone(),
                },
                f64::INFINITY,
            )
        })?;
        placed.push(entry);
    }
    if by_task.len() != problem.len() {
        let stray = schedule
            .entries
            .iter()
            .find(|e| problem.task_index(&e.task_id).is_none())
            .map(|e| e.task_id.clone())
            .unwrap_or_default();
        return Err(ValidationError::new(
            ViolatedConstraint::Unscheduled { task: stray },
            f64::INFINITY,
        ));
    }

    for (t, task) in problem.tasks().iter().enumerate() {
        let entry = placed[t];
        let task_id = || task.id.clone();

        let drift = (entry.end - entry.start - task.duration).abs();
        if !(drift <= epsilon) {
            return Err(ValidationError::new(
                ViolatedConstraint::Duration { task: task_id() },
                drift,
            ));
        }

        let early = task.release() - entry.start;
        if early > epsilon {
            return Err(ValidationError::new(
                ViolatedConstraint::EarliestStart { task: task_id() },
                early,
            ));
        }

        if let Some(deadline) = task.deadline {
            let late = entry.end - deadline;
            if late > epsilon {
                return Err(ValidationError::new(
                    ViolatedConstraint::Deadline { task: task_id() },
                    late,
                ));
            }
        }

        let resource = problem
            .resource_index(&entry.resource_id)
            .filter(|r| problem.eligible_resources(t).contains(r))
            .ok_or_else(|| {
                ValidationError::new(
                    ViolatedConstraint::Eligibility {
                        task: task_id(),
                        resource: entry.resource_id.clone(),
                    },
                    1.0,
                )
            })?;

        if let Some(window) = problem.resource(resource).availability {
            if !window.contains(entry.start, entry.end, epsilon) {
                let outside = (window.from - entry.start).max(entry.end - window.to);
                return Err(ValidationError::new(
                    ViolatedConstraint::ResourceWindow {
                        task: task_id(),
                        resource: entry.resource_id.clone(),
                    },
                    outside,
                ));
            }
        }
    }

    for (u, v) in problem.edges() {
        let gap = placed[u].end - placed[v].start;
        if gap > epsilon {
            return Err(ValidationError::new(
                ViolatedConstraint::Precedence {
                    predecessor: problem.task(u).id.clone(),
                    successor: problem.task(v).id.clone(),
                },
                gap,
            ));
        }
    }

    for resource in problem.resources() {
        let on_resource = schedule.entries_on(&resource.id);
        if let Some((at, excess)) = peak_overload(&on_resource, resource.capacity, epsilon) {
            return Err(ValidationError::new(
                ViolatedConstraint::Capacity {
                    resource: resource.id.clone(),
                    at,
                },
                excess,
            ));
        }
    }

    Ok(())
}

/// Sweep line over the intervals of one resource, each shrunk on both sides by
/// `epsilon` or a quarter of its length, whichever is smaller. Returns the
/// first instant the load exceeds `capacity`.
fn peak_overload(entries: &[&ScheduleEntry], capacity: u32, epsilon: f64) -> Option<(f64, f64)> {
    let mut events: Vec<(f64, i64)> = entries
        .iter()
        .map(|e| {
            let shrink = epsilon.min((e.end - e.start) / 4.0);
            (e.start + shrink, e.end - shrink)
        })
        .flat_map(|(start, end)| [(start, 1), (end, -1)])
        .collect();

    // Releases before acquisitions at the same instant
    events.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let capacity = i64::from(capacity);
    let mut load = 0i64;
    for (at, delta) in events {
        load += delta;
        if load > capacity {
            return Some((at, (load - capacity) as f64));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::model_builder::ModelBuilder;
    use crate::domain::{Resource, SolutionStatus, Task};

    fn problem() -> SchedulingProblem {
        SchedulingProblem::new(
            vec![
                Task::new("A", 3.0, "M1"),
                Task::new("B", 4.0, "M1"),
                Task::new("C", 2.0, "M2")
                    .on_any_of(["M2", "M3"])
                    .with_predecessor("A"),
            ],
            vec![Resource::new("M1"), Resource::new("M2"), Resource::new("M3")],
        )
        .unwrap()
    }

    fn solution(model: &ScheduleModel, assign: &[(&str, f64)]) -> Solution {
        let f = model.formulation();
        let mut values = vec![0.0; f.num_variables()];
        for (name, value) in assign {
            values[f.variable_index(name).unwrap()] = *value;
        }
        Solution::with_values(SolutionStatus::Optimal, 7.0, values)
    }

    fn entry(task: &str, resource: &str, start: f64, end: f64) -> ScheduleEntry {
        ScheduleEntry {
            task_id: task.into(),
            resource_id: resource.into(),
            start,
            end,
            on_time: None,
            tardiness: 0.0,
        }
    }

    fn schedule(entries: Vec<ScheduleEntry>) -> Schedule {
        Schedule {
            entries,
            ..Schedule::empty()
        }
    }

    #[test]
    fn test_decodes_valid_solution() {
        let problem = problem();
        let model = ModelBuilder::default().build(&problem).unwrap();
        let solution = solution(
            &model,
            &[
                ("start[A]", 0.0),
                ("start[B]", 3.0),
                ("start[C]", 3.0),
                ("assign[C,M3#0]", 1.0),
                ("order[A,B]", 1.0),
                ("makespan", 7.0),
            ],
        );

        let schedule = SolutionInterpreter::default()
            .interpret(&problem, &model, &solution)
            .unwrap();

        assert_eq!(schedule.len(), 3);
        assert_eq!(schedule.makespan(), 7.0);
        assert_eq!(schedule.entry("C").unwrap().resource_id, "M3");
        assert_eq!(schedule.entry("B").unwrap().end, 7.0);
        assert_eq!(schedule.status, SolutionStatus::Optimal);
    }

    #[test]
    fn test_tolerates_rounding_noise() {
        let problem = problem();
        let model = ModelBuilder::default().build(&problem).unwrap();
        let solution = solution(
            &model,
            &[
                ("start[A]", 0.0),
                ("start[B]", 2.999_999_9),
                ("start[C]", 2.999_999_9),
                ("assign[C,M2#0]", 0.999_999_8),
                ("order[A,B]", 1.0),
            ],
        );
        let schedule = SolutionInterpreter::new(1e-6)
            .interpret(&problem, &model, &solution)
            .unwrap();
        // values are reported as returned, not snapped
        assert_eq!(schedule.entry("B").unwrap().start, 2.999_999_9);
    }

    #[test]
    fn test_rejects_overlap() {
        let problem = problem();
        let model = ModelBuilder::default().build(&problem).unwrap();
        let solution = solution(
            &model,
            &[
                ("start[A]", 0.0),
                ("start[B]", 1.0),
                ("start[C]", 3.0),
                ("assign[C,M2#0]", 1.0),
            ],
        );
        let err = SolutionInterpreter::default()
            .interpret(&problem, &model, &solution)
            .unwrap_err();
        assert!(matches!(
            err.violated_constraint,
            ViolatedConstraint::Capacity { ref resource, .. } if resource == "M1"
        ));
        assert_eq!(err.magnitude, 1.0);
    }

    #[test]
    fn test_rejects_precedence_violation() {
        let problem = problem();
        let model = ModelBuilder::default().build(&problem).unwrap();
        let solution = solution(
            &model,
            &[
                ("start[A]", 0.0),
                ("start[B]", 3.0),
                ("start[C]", 2.5),
                ("assign[C,M2#0]", 1.0),
            ],
        );
        let err = SolutionInterpreter::default()
            .interpret(&problem, &model, &solution)
            .unwrap_err();
        assert_eq!(
            err.violated_constraint,
            ViolatedConstraint::Precedence {
                predecessor: "A".into(),
                successor: "C".into()
            }
        );
        assert!((err.magnitude - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_ambiguous_assignment() {
        let problem = problem();
        let model = ModelBuilder::default().build(&problem).unwrap();
        let solution = solution(
            &model,
            &[
                ("start[B]", 3.0),
                ("start[C]", 3.0),
                ("assign[C,M2#0]", 1.0),
                ("assign[C,M3#0]", 1.0),
            ],
        );
        let err = SolutionInterpreter::default()
            .interpret(&problem, &model, &solution)
            .unwrap_err();
        assert!(matches!(
            err.violated_constraint,
            ViolatedConstraint::AmbiguousAssignment { .. }
        ));
    }

    #[test]
    fn test_rejects_missing_values() {
        let problem = problem();
        let model = ModelBuilder::default().build(&problem).unwrap();
        let empty = Solution::new(SolutionStatus::Timeout, "no incumbent");
        let err = SolutionInterpreter::default()
            .interpret(&problem, &model, &empty)
            .unwrap_err();
        assert!(matches!(
            err.violated_constraint,
            ViolatedConstraint::Unscheduled { .. }
        ));
    }

    #[test]
    fn test_validate_deadline_and_release() {
        let problem = SchedulingProblem::new(
            vec![Task::new("A", 2.0, "M1")
                .with_earliest_start(1.0)
                .with_deadline(4.0)],
            vec![Resource::new("M1")],
        )
        .unwrap();

        let early = schedule(vec![entry("A", "M1", 0.5, 2.5)]);
        let err = validate_schedule(&problem, &early, 1e-6).unwrap_err();
        assert_eq!(
            err.violated_constraint,
            ViolatedConstraint::EarliestStart { task: "A".into() }
        );

        let late = schedule(vec![entry("A", "M1", 3.0, 5.0)]);
        let err = validate_schedule(&problem, &late, 1e-6).unwrap_err();
        assert_eq!(
            err.violated_constraint,
            ViolatedConstraint::Deadline { task: "A".into() }
        );

        let ok = schedule(vec![entry("A", "M1", 2.0, 4.0)]);
        assert!(validate_schedule(&problem, &ok, 1e-6).is_ok());
    }

    #[test]
    fn test_validate_wrong_duration_and_resource() {
        let problem = SchedulingProblem::new(
            vec![Task::new("A", 2.0, "M1")],
            vec![Resource::new("M1"), Resource::new("M2")],
        )
        .unwrap();

        let stretched = schedule(vec![entry("A", "M1", 0.0, 3.0)]);
        let err = validate_schedule(&problem, &stretched, 1e-6).unwrap_err();
        assert!(matches!(
            err.violated_constraint,
            ViolatedConstraint::Duration { .. }
        ));

        let moved = schedule(vec![entry("A", "M2", 0.0, 2.0)]);
        let err = validate_schedule(&problem, &moved, 1e-6).unwrap_err();
        assert!(matches!(
            err.violated_constraint,
            ViolatedConstraint::Eligibility { .. }
        ));
    }

    #[test]
    fn test_validate_resource_window() {
        let problem = SchedulingProblem::new(
            vec![Task::new("A", 2.0, "M1")],
            vec![Resource::new("M1").available_between(1.0, 10.0)],
        )
        .unwrap();
        let err = validate_schedule(&problem, &schedule(vec![entry("A", "M1", 0.0, 2.0)]), 1e-6)
            .unwrap_err();
        assert!(matches!(
            err.violated_constraint,
            ViolatedConstraint::ResourceWindow { .. }
        ));
        assert_eq!(err.magnitude, 1.0);
    }

    #[test]
    fn test_validate_coverage() {
        let problem = SchedulingProblem::new(
            vec![Task::new("A", 1.0, "M1"), Task::new("B", 1.0, "M1")],
            vec![Resource::new("M1")],
        )
        .unwrap();

        let missing = schedule(vec![entry("A", "M1", 0.0, 1.0)]);
        let err = validate_schedule(&problem, &missing, 1e-6).unwrap_err();
        assert_eq!(
            err.violated_constraint,
            ViolatedConstraint::Unscheduled { task: "B".into() }
        );

        let twice = schedule(vec![
            entry("A", "M1", 0.0, 1.0),
            entry("A", "M1", 1.0, 2.0),
            entry("B", "M1", 2.0, 3.0),
        ]);
        let err = validate_schedule(&problem, &twice, 1e-6).unwrap_err();
        assert!(matches!(
            err.violated_constraint,
            ViolatedConstraint::DuplicateEntry { .. }
        ));
    }

    #[test]
    fn test_capacity_allows_touching_intervals() {
        let problem = SchedulingProblem::new(
            vec![
                Task::new("A", 1.0, "M1"),
                Task::new("B", 1.0, "M1"),
                Task::new("C", 1.0, "M1"),
            ],
            vec![Resource::new("M1").with_capacity(2)],
        )
        .unwrap();

        let ok = schedule(vec![
            entry("A", "M1", 0.0, 1.0),
            entry("B", "M1", 0.0, 1.0),
            entry("C", "M1", 1.0, 2.0),
        ]);
        assert!(validate_schedule(&problem, &ok, 1e-6).is_ok());

        let crowded = schedule(vec![
            entry("A", "M1", 0.0, 1.0),
            entry("B", "M1", 0.0, 1.0),
            entry("C", "M1", 0.5, 1.5),
        ]);
        let err = validate_schedule(&problem, &crowded, 1e-6).unwrap_err();
        assert!(matches!(
            err.violated_constraint,
            ViolatedConstraint::Capacity { .. }
        ));
    }

    #[test]
    fn test_capacity_beyond_i32() {
        let problem = SchedulingProblem::new(
            vec![Task::new("A", 1.0, "M")],
            vec![Resource::new("M").with_capacity(3_000_000_000)],
        )
        .unwrap();
        let single = schedule(vec![entry("A", "M", 0.0, 1.0)]);
        assert!(validate_schedule(&problem, &single, 1e-6).is_ok());
    }

    #[test]
    fn test_short_tasks_still_occupy_the_resource() {
        let problem = SchedulingProblem::new(
            vec![Task::new("A", 1e-6, "M"), Task::new("B", 1e-6, "M")],
            vec![Resource::new("M")],
        )
        .unwrap();

        let stacked = schedule(vec![entry("A", "M", 0.0, 1e-6), entry("B", "M", 0.0, 1e-6)]);
        let err = validate_schedule(&problem, &stacked, 1e-6).unwrap_err();
        assert!(matches!(
            err.violated_constraint,
            ViolatedConstraint::Capacity { .. }
        ));

        let sequenced = schedule(vec![entry("A", "M", 0.0, 1e-6), entry("B", "M", 1e-6, 2e-6)]);
        assert!(validate_schedule(&problem, &sequenced, 1e-6).is_ok());
    }

    #[test]
    fn test_tardiness_uses_the_on_time_tolerance() {
        let problem = SchedulingProblem::new(
            vec![Task::new("A", 3.0, "M1").with_due_date(3.0)],
            vec![Resource::new("M1")],
        )
        .unwrap();
        let model = ModelBuilder::default().build(&problem).unwrap();

        let barely = solution(&model, &[("start[A]", 1e-9), ("makespan", 3.0)]);
        let schedule = SolutionInterpreter::new(1e-6)
            .interpret(&problem, &model, &barely)
            .unwrap();
        let a = schedule.entry("A").unwrap();
        assert_eq!(a.on_time, Some(true));
        assert_eq!(a.tardiness, 0.0);
        assert_eq!(schedule.weighted_tardiness, 0.0);

        let late = solution(&model, &[("start[A]", 0.5), ("makespan", 3.5)]);
        let schedule = SolutionInterpreter::new(1e-6)
            .interpret(&problem, &model, &late)
            .unwrap();
        let a = schedule.entry("A").unwrap();
        assert_eq!(a.on_time, Some(false));
        assert_eq!(a.tardiness, 0.5);
    }
}
