// Compiles a `SchedulingProblem` into a mixed-integer `Formulation`.
//
// # Encoding
//
// Each resource of capacity `c` with `n` competing tasks is split into unit
// *lanes*: `min(c, n)` exclusive lanes, or a single non-exclusive lane when
// `c >= n`. Unit-demand tasks respect capacity `c` exactly when they can be
// spread over `c` unit machines, so pairwise disjunctions on lanes are a
// uniform and exact capacity encoding.
//
// | variable | kind | meaning |
// |---|---|---|
// | `start[t]` | continuous / integer | start time of task `t` |
// | `assign[t,r#k]` | binary | `t` runs on lane `k` of resource `r` (only when `t` has several lanes) |
// | `order[i,j]` | binary | `i` precedes `j` on their shared lane |
// | `makespan` | continuous | latest end time |
// | `tardiness[t]` | continuous | lateness of `t` past its due date |
// | `on_time[t]` | binary | `t` finishes by its due date |
//
// # Big-M
//
// `M` is the largest end time any start bound allows, raised to cover every
// finite resource window bound. All starts are `>= 0`, so
// `start[i] + d_i - start[j] <= M` for every pair and each relaxed row is
// slack whenever its binary switches it off.

use crate::application::config::{HorizonPolicy, ModelConfig};
use crate::domain::{
    Constraint, Formulation, ObjectiveFunction, ObjectiveKind, SchedulingProblem, Variable,
};
use std::sync::Arc;
use tracing::debug;

/// Errors raised while compiling a problem. No solve is attempted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormulationError {
    #[error("No horizon can be derived: time variables would be unbounded")]
    UnboundedHorizon,

    #[error("Invalid horizon {0}: must be a positive finite number")]
    InvalidHorizon(f64),
}

/// One unit of a resource's capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lane {
    pub resource: usize,
    pub unit: u32,
    /// False when the resource has room for every task that may use it
    pub exclusive: bool,
}

/// How a task's lane is chosen
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// Only one lane is possible
    Fixed(usize),
    /// `(lane, binary variable)` per candidate lane, exactly one selected
    Choice(Vec<(usize, usize)>),
}

impl Assignment {
    fn lanes(&self) -> Vec<usize> {
        match self {
            Assignment::Fixed(lane) => vec![*lane],
            Assignment::Choice(options) => options.iter().map(|&(lane, _)| lane).collect(),
        }
    }

    fn variable_for(&self, lane: usize) -> Option<usize> {
        match self {
            Assignment::Fixed(_) => None,
            Assignment::Choice(options) => options
                .iter()
                .find(|&&(l, _)| l == lane)
                .map(|&(_, var)| var),
        }
    }
}

/// Variables that describe one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskVariables {
    pub start: usize,
    pub assignment: Assignment,
    pub tardiness: Option<usize>,
    pub on_time: Option<usize>,
}

/// A formulation together with the layout needed to decode its solutions
#[derive(Debug, Clone)]
pub struct ScheduleModel {
    formulation: Arc<Formulation>,
    lanes: Vec<Lane>,
    tasks: Vec<TaskVariables>,
    makespan: Option<usize>,
    objective: ObjectiveKind,
    horizon: f64,
    big_m: f64,
}

impl ScheduleModel {
    pub fn formulation(&self) -> &Formulation {
        &self.formulation
    }

    /// Shared handle for solving on another thread
    pub fn shared_formulation(&self) -> Arc<Formulation> {
        Arc::clone(&self.formulation)
    }

    pub fn lanes(&self) -> &[Lane] {
        &self.lanes
    }

    pub fn lane(&self, index: usize) -> &Lane {
        &self.lanes[index]
    }

    pub fn task_variables(&self, task: usize) -> &TaskVariables {
        &self.tasks[task]
    }

    pub fn makespan_variable(&self) -> Option<usize> {
        self.makespan
    }

    pub fn objective(&self) -> ObjectiveKind {
        self.objective
    }

    pub fn horizon(&self) -> f64 {
        self.horizon
    }

    pub fn big_m(&self) -> f64 {
        self.big_m
    }
}

/// Deterministic problem-to-formulation compiler
#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    config: ModelConfig,
}

impl ModelBuilder {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    /// Upper bound on every end time.
    ///
    /// An explicit problem horizon wins over the configured policy.
    pub fn horizon(&self, problem: &SchedulingProblem) -> Result<f64, FormulationError> {
        let positive = |h: f64| {
            if h.is_finite() && h > 0.0 {
                Ok(h)
            } else {
                Err(FormulationError::InvalidHorizon(h))
            }
        };

        if let Some(h) = problem.horizon() {
            return positive(h);
        }

        match self.config.horizon {
            HorizonPolicy::Fixed(h) => positive(h),
            HorizonPolicy::Derived => {
                let task_lower = problem.tasks().iter().map(|t| t.release());
                let window_lower = problem
                    .resources()
                    .iter()
                    .filter_map(|r| r.availability.map(|w| w.from));
                let lower = task_lower.chain(window_lower).fold(0.0, f64::max);
                let total: f64 = problem.tasks().iter().map(|t| t.duration).sum();
                let h = lower + total;
                if h.is_finite() {
                    Ok(h)
                } else {
                    Err(FormulationError::UnboundedHorizon)
                }
            }
            HorizonPolicy::Deadlines => {
                let deadlines = problem.tasks().iter().filter_map(|t| t.deadline);
                let window_ends = problem
                    .resources()
                    .iter()
                    .filter_map(|r| r.availability.map(|w| w.to));
                deadlines
                    .chain(window_ends)
                    .reduce(f64::max)
                    .filter(|h| h.is_finite() && *h > 0.0)
                    .ok_or(FormulationError::UnboundedHorizon)
            }
        }
    }

    pub fn build(&self, problem: &SchedulingProblem) -> Result<ScheduleModel, FormulationError> {
        let horizon = self.horizon(problem)?;
        let n = problem.len();
        let mut f = Formulation::new("schedule");

        // Lanes per resource
        let mut lanes = Vec::new();
        let mut resource_lanes = Vec::with_capacity(problem.resources().len());
        for (r, resource) in problem.resources().iter().enumerate() {
            let competing = problem.tasks_eligible_for(r).len();
            let mut own = Vec::new();
            if competing > 0 {
                let exclusive = (resource.capacity as usize) < competing;
                let units = if exclusive { resource.capacity } else { 1 };
                for unit in 0..units {
                    own.push(lanes.len());
                    lanes.push(Lane {
                        resource: r,
                        unit,
                        exclusive,
                    });
                }
            }
            resource_lanes.push(own);
        }

        // Start windows [release, min(horizon, deadline) - duration]
        let windows: Vec<(f64, f64)> = problem
            .tasks()
            .iter()
            .map(|t| {
                let latest_end = t.deadline.map_or(horizon, |d| d.min(horizon));
                (t.release(), latest_end - t.duration)
            })
            .collect();

        let big_m = big_m(problem, &windows);

        let mut starts = Vec::with_capacity(n);
        for (t, task) in problem.tasks().iter().enumerate() {
            let (lb, ub) = windows[t];
            let name = format!("start[{}]", task.id);
            let var = if self.config.integral_times {
                Variable::integer(name)
            } else {
                Variable::continuous(name)
            };
            let start = f.add_variable(var.with_bounds(lb, Some(ub.max(lb))));
            if ub < lb {
                // Empty window: leave the verdict to the solver
                f.add_constraint(
                    Constraint::leq(vec![(start, 1.0)], ub).with_name(format!("window[{}]", task.id)),
                );
            }
            starts.push(start);
        }

        let mut assignments = Vec::with_capacity(n);
        for (t, task) in problem.tasks().iter().enumerate() {
            let candidates: Vec<usize> = problem
                .eligible_resources(t)
                .iter()
                .flat_map(|&r| resource_lanes[r].iter().copied())
                .collect();

            let assignment = if candidates.len() == 1 {
                Assignment::Fixed(candidates[0])
            } else {
                let options: Vec<(usize, usize)> = candidates
                    .iter()
                    .map(|&lane| {
                        let l = lanes[lane];
                        let name = format!(
                            "assign[{},{}#{}]",
                            task.id,
                            problem.resource(l.resource).id,
                            l.unit
                        );
                        (lane, f.add_variable(Variable::binary(name)))
                    })
                    .collect();
                let terms = options.iter().map(|&(_, var)| (var, 1.0)).collect();
                f.add_constraint(
                    Constraint::eq(terms, 1.0).with_name(format!("assign[{}]", task.id)),
                );
                Assignment::Choice(options)
            };
            assignments.push(assignment);
        }

        // Resource availability windows
        for (t, task) in problem.tasks().iter().enumerate() {
            for &r in problem.eligible_resources(t) {
                let resource = problem.resource(r);
                let Some(window) = resource.availability else {
                    continue;
                };
                let selectors: Vec<(usize, f64)> = resource_lanes[r]
                    .iter()
                    .filter_map(|&lane| assignments[t].variable_for(lane))
                    .map(|var| (var, big_m))
                    .collect();
                let relax = if selectors.is_empty() { 0.0 } else { big_m };

                // start + M·x >= from
                let mut from_terms = vec![(starts[t], 1.0)];
                from_terms.extend(selectors.iter().map(|&(var, m)| (var, -m)));
                f.add_constraint(
                    Constraint::geq(from_terms, window.from - relax)
                        .with_name(format!("avail_from[{},{}]", task.id, resource.id)),
                );

                // start + d <= to + M·(1 - x)
                let mut to_terms = vec![(starts[t], 1.0)];
                to_terms.extend(selectors.iter().copied());
                f.add_constraint(
                    Constraint::leq(to_terms, window.to - task.duration + relax)
                        .with_name(format!("avail_to[{},{}]", task.id, resource.id)),
                );
            }
        }

        for (u, v) in problem.edges() {
            let pred = problem.task(u);
            f.add_constraint(
                Constraint::geq(vec![(starts[v], 1.0), (starts[u], -1.0)], pred.duration)
                    .with_name(format!("prec[{},{}]", pred.id, problem.task(v).id)),
            );
        }

        let closure = problem.precedence_closure();
        let task_lanes: Vec<Vec<usize>> = assignments.iter().map(Assignment::lanes).collect();
        let mut disjunctions = 0usize;
        for i in 0..n {
            for j in (i + 1)..n {
                if closure[i][j] || closure[j][i] {
                    continue;
                }
                let shared: Vec<usize> = task_lanes[i]
                    .iter()
                    .copied()
                    .filter(|&lane| lanes[lane].exclusive && task_lanes[j].contains(&lane))
                    .collect();
                if shared.is_empty() {
                    continue;
                }

                let (ti, tj) = (problem.task(i), problem.task(j));
                let order = f.add_variable(Variable::binary(format!("order[{},{}]", ti.id, tj.id)));
                disjunctions += 1;

                for lane in shared {
                    let l = lanes[lane];
                    let label = format!("{}#{}", problem.resource(l.resource).id, l.unit);
                    let xi = assignments[i].variable_for(lane);
                    let xj = assignments[j].variable_for(lane);
                    let relax = big_m * (xi.is_some() as u8 + xj.is_some() as u8) as f64;
                    let selectors: Vec<(usize, f64)> =
                        xi.into_iter().chain(xj).map(|var| (var, big_m)).collect();

                    // i before j: start_i + d_i <= start_j + M(1 - order) + M(1 - x_i) + M(1 - x_j)
                    let mut before = vec![(starts[i], 1.0), (starts[j], -1.0), (order, big_m)];
                    before.extend(selectors.iter().copied());
                    f.add_constraint(
                        Constraint::leq(before, big_m + relax - ti.duration)
                            .with_name(format!("disj[{},{},{}]", ti.id, tj.id, label)),
                    );

                    // j before i: start_j + d_j <= start_i + M·order + M(1 - x_i) + M(1 - x_j)
                    let mut after = vec![(starts[j], 1.0), (starts[i], -1.0), (order, -big_m)];
                    after.extend(selectors.iter().copied());
                    f.add_constraint(
                        Constraint::leq(after, relax - tj.duration)
                            .with_name(format!("disj[{},{},{}]", tj.id, ti.id, label)),
                    );
                }
            }
        }

        let mut tardiness = vec![None; n];
        let mut on_time = vec![None; n];
        let mut makespan = None;
        match self.config.objective {
            ObjectiveKind::Makespan => {
                let cmax = f.add_variable(
                    Variable::continuous("makespan").with_bounds(0.0, Some(big_m)),
                );
                for (t, task) in problem.tasks().iter().enumerate() {
                    f.add_constraint(
                        Constraint::geq(vec![(cmax, 1.0), (starts[t], -1.0)], task.duration)
                            .with_name(format!("span[{}]", task.id)),
                    );
                }
                f.set_objective(ObjectiveFunction::minimize(vec![(cmax, 1.0)]));
                makespan = Some(cmax);
            }
            ObjectiveKind::WeightedTardiness => {
                let mut terms = Vec::new();
                for (t, task) in problem.tasks().iter().enumerate() {
                    let Some(due) = task.target() else {
                        continue;
                    };
                    // Every end is at most big-M
                    let var = f.add_variable(
                        Variable::continuous(format!("tardiness[{}]", task.id))
                            .with_bounds(0.0, Some((big_m - due).max(0.0))),
                    );
                    // tardiness >= start + d - due
                    f.add_constraint(
                        Constraint::geq(vec![(var, 1.0), (starts[t], -1.0)], task.duration - due)
                            .with_name(format!("tardy[{}]", task.id)),
                    );
                    terms.push((var, task.weight));
                    tardiness[t] = Some(var);
                }
                f.set_objective(ObjectiveFunction::minimize(terms));
            }
            ObjectiveKind::OnTimeReward => {
                let mut terms = Vec::new();
                for (t, task) in problem.tasks().iter().enumerate() {
                    let Some(due) = task.target() else {
                        continue;
                    };
                    let var = f.add_variable(Variable::binary(format!("on_time[{}]", task.id)));
                    // start + d <= due + M(1 - on_time)
                    f.add_constraint(
                        Constraint::leq(
                            vec![(starts[t], 1.0), (var, big_m)],
                            due + big_m - task.duration,
                        )
                        .with_name(format!("on_time[{}]", task.id)),
                    );
                    terms.push((var, task.weight));
                    on_time[t] = Some(var);
                }
                f.set_objective(ObjectiveFunction::maximize(terms));
            }
        }

        debug!(
            tasks = n,
            lanes = lanes.len(),
            disjunctions,
            variables = f.num_variables(),
            constraints = f.num_constraints(),
            horizon,
            big_m,
            "formulation built"
        );

        let tasks = starts
            .into_iter()
            .zip(assignments)
            .zip(tardiness.into_iter().zip(on_time))
            .map(|((start, assignment), (tardiness, on_time))| TaskVariables {
                start,
                assignment,
                tardiness,
                on_time,
            })
            .collect();

        Ok(ScheduleModel {
            formulation: Arc::new(f),
            lanes,
            tasks,
            makespan,
            objective: self.config.objective,
            horizon,
            big_m,
        })
    }
}

/// The largest end time any start bound admits, covering finite window bounds.
fn big_m(problem: &SchedulingProblem, windows: &[(f64, f64)]) -> f64 {
    let ends = problem
        .tasks()
        .iter()
        .zip(windows)
        .map(|(task, &(lb, ub))| ub.max(lb) + task.duration);
    let availability = problem
        .resources()
        .iter()
        .filter_map(|r| r.availability)
        .flat_map(|w| [w.from, w.to]);
    ends.chain(availability).fold(0.0, f64::max)
}
