// The scheduling use case: build the formulation, solve it, decode the result.
//
// Each request walks `Building -> Solving -> Interpreting -> Done` and stops
// at the first failure, which is reported as a `SchedulingError` carrying
// the stage it happened in.

use crate::application::config::{ConfigError, SchedulerConfig};
use crate::application::interpreter::{SolutionInterpreter, ValidationError};
use crate::application::model_builder::{FormulationError, ModelBuilder, ScheduleModel};
use crate::domain::{
    ProblemDescription, ProblemError, Schedule, SchedulingProblem, Solution, SolutionStatus,
    SolverError, SolverService,
};
use crate::solver::SolverFactory;
use futures::future::{AbortHandle, Abortable};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument, Span};

/// The pipeline step a request is in or failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Building,
    Solving,
    Interpreting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Building => write!(f, "building"),
            Stage::Solving => write!(f, "solving"),
            Stage::Interpreting => write!(f, "interpreting"),
        }
    }
}

/// Lifecycle of one scheduling request
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestState {
    #[default]
    Building,
    Solving,
    Interpreting,
    Done,
    Failed { stage: Stage, reason: String },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Illegal request transition from {from:?} to {to:?}")]
pub struct IllegalTransition {
    pub from: RequestState,
    pub to: RequestState,
}

impl RequestState {
    /// The stage of a running request, `None` once terminal.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RequestState::Building => Some(Stage::Building),
            RequestState::Solving => Some(Stage::Solving),
            RequestState::Interpreting => Some(Stage::Interpreting),
            RequestState::Done | RequestState::Failed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage().is_none()
    }

    /// Moves to `next` if the lifecycle allows it.
    ///
    /// A problem without tasks completes straight from `Building`.
    pub fn transition(
        &self,
        next: RequestState,
    ) -> std::result::Result<RequestState, IllegalTransition> {
        let allowed = matches!(
            (self, &next),
            (RequestState::Building, RequestState::Solving)
                | (RequestState::Building, RequestState::Done)
                | (RequestState::Solving, RequestState::Interpreting)
                | (RequestState::Interpreting, RequestState::Done)
        ) || (!self.is_terminal() && matches!(next, RequestState::Failed { .. }));

        if allowed {
            Ok(next)
        } else {
            Err(IllegalTransition {
                from: self.clone(),
                to: next,
            })
        }
    }
}

/// Why a request produced no schedule
#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("Invalid problem: {0}")]
    Problem(#[from] ProblemError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Formulation failed: {0}")]
    Formulation(#[from] FormulationError),

    #[error("Problem is infeasible: {0}")]
    Infeasible(String),

    #[error("Time limit reached without a feasible schedule: {0}")]
    TimedOut(String),

    #[error("Solver failed: {0}")]
    Solver(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Scheduling request cancelled")]
    Cancelled,
}

impl From<SolverError> for SchedulingError {
    fn from(e: SolverError) -> Self {
        SchedulingError::Solver(e.to_string())
    }
}

impl SchedulingError {
    pub fn stage(&self) -> Stage {
        match self {
            SchedulingError::Problem(_)
            | SchedulingError::Config(_)
            | SchedulingError::Formulation(_) => Stage::Building,
            SchedulingError::Infeasible(_)
            | SchedulingError::TimedOut(_)
            | SchedulingError::Solver(_)
            | SchedulingError::Cancelled => Stage::Solving,
            SchedulingError::Validation(_) => Stage::Interpreting,
        }
    }

    /// The solve status this failure corresponds to
    pub fn status(&self) -> SolutionStatus {
        match self {
            SchedulingError::Infeasible(_) => SolutionStatus::Infeasible,
            SchedulingError::TimedOut(_) => SolutionStatus::Timeout,
            _ => SolutionStatus::Error,
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulingError>;

/// Tracks the lifecycle of one request and logs its transitions
#[derive(Debug, Default)]
struct Request {
    state: RequestState,
}

impl Request {
    fn enter(&mut self, next: RequestState) {
        match self.state.transition(next) {
            Ok(state) => {
                debug!(?state, "request state");
                self.state = state;
            }
            Err(e) => warn!(error = %e, "request state unchanged"),
        }
    }

    fn finish(mut self, outcome: Result<Schedule>) -> Result<Schedule> {
        match &outcome {
            Ok(schedule) => {
                self.enter(RequestState::Done);
                info!(
                    status = %schedule.status,
                    entries = schedule.len(),
                    makespan = schedule.makespan(),
                    "schedule ready"
                );
            }
            Err(e) => {
                let stage = self.state.stage().unwrap_or(e.stage());
                self.enter(RequestState::Failed {
                    stage,
                    reason: e.to_string(),
                });
                warn!(%stage, status = %e.status(), error = %e, "scheduling failed");
            }
        }
        outcome
    }
}

/// Rejects solve outcomes that carry no usable assignment.
fn accept(solution: Solution) -> Result<Solution> {
    match solution.status {
        SolutionStatus::Infeasible => Err(SchedulingError::Infeasible(solution.message)),
        SolutionStatus::Timeout if !solution.has_values() => {
            Err(SchedulingError::TimedOut(solution.message))
        }
        SolutionStatus::Error => Err(SchedulingError::Solver(solution.message)),
        _ if !solution.has_values() => Err(SchedulingError::Solver(format!(
            "{} status without variable values",
            solution.status
        ))),
        _ => Ok(solution),
    }
}

fn request_span(problem: &SchedulingProblem, solver: &str) -> Span {
    info_span!(
        "schedule",
        tasks = problem.len(),
        resources = problem.resources().len(),
        solver = solver
    )
}

/// Builds the model, or `None` when there is nothing to schedule.
fn build(
    config: &SchedulerConfig,
    problem: &SchedulingProblem,
    request: &mut Request,
) -> Result<Option<ScheduleModel>> {
    config.validate()?;
    if problem.is_empty() {
        debug!("no tasks, skipping the solver");
        return Ok(None);
    }
    let model = ModelBuilder::new(config.model.clone()).build(problem)?;
    request.enter(RequestState::Solving);
    Ok(Some(model))
}

fn interpret(
    config: &SchedulerConfig,
    problem: &SchedulingProblem,
    model: &ScheduleModel,
    solution: Solution,
    request: &mut Request,
) -> Result<Schedule> {
    info!(
        status = %solution.status,
        solve_time_ms = solution.statistics.solve_time_ms,
        objective = solution.objective_value,
        "solve finished"
    );
    let solution = accept(solution)?;
    request.enter(RequestState::Interpreting);
    let schedule =
        SolutionInterpreter::new(config.epsilon).interpret(problem, model, &solution)?;
    Ok(schedule)
}

/// Runs the whole pipeline on the calling thread with the given solver.
pub(crate) fn optimize_with(
    solver: &dyn SolverService,
    config: &SchedulerConfig,
    problem: &SchedulingProblem,
) -> Result<Schedule> {
    let span = request_span(problem, solver.name());
    let _entered = span.enter();

    let mut request = Request::default();
    let outcome = build(config, problem, &mut request).and_then(|model| match model {
        None => Ok(Schedule::empty()),
        Some(model) => solver
            .solve(model.formulation(), &config.solver)
            .map_err(SchedulingError::from)
            .and_then(|solution| interpret(config, problem, &model, solution, &mut request)),
    });
    request.finish(outcome)
}

/// Facade over model building, solving and interpretation
#[derive(Clone)]
pub struct Scheduler {
    solver: Arc<dyn SolverService>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(solver: Arc<dyn SolverService>, config: SchedulerConfig) -> Self {
        Self { solver, config }
    }

    /// Uses the backend named in `config.solver`.
    pub fn from_config(config: SchedulerConfig) -> std::result::Result<Self, SolverError> {
        let solver = SolverFactory::create_from_backend(config.solver.backend)?;
        Ok(Self::new(solver, config))
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn solver_name(&self) -> &str {
        self.solver.name()
    }

    pub fn optimize(&self, problem: &SchedulingProblem) -> Result<Schedule> {
        optimize_with(self.solver.as_ref(), &self.config, problem)
    }

    /// Validates a raw description, then optimizes it.
    pub fn optimize_description(&self, description: ProblemDescription) -> Result<Schedule> {
        let problem = SchedulingProblem::try_from(description)?;
        self.optimize(&problem)
    }

    /// Like [`optimize`](Self::optimize), with the solve on a blocking thread.
    ///
    /// Dropping the future abandons the solve; its result is discarded.
    pub async fn optimize_async(&self, problem: &SchedulingProblem) -> Result<Schedule> {
        let span = request_span(problem, self.solver.name());
        async move {
            let mut request = Request::default();
            let outcome = match build(&self.config, problem, &mut request) {
                Ok(None) => Ok(Schedule::empty()),
                Ok(Some(model)) => match self.solve_blocking(&model).await {
                    Ok(solution) => {
                        interpret(&self.config, problem, &model, solution, &mut request)
                    }
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            request.finish(outcome)
        }
        .instrument(span)
        .await
    }

    /// Gives up with [`SchedulingError::Cancelled`] once `deadline` elapses.
    pub async fn optimize_with_deadline(
        &self,
        problem: &SchedulingProblem,
        deadline: Duration,
    ) -> Result<Schedule> {
        tokio::time::timeout(deadline, self.optimize_async(problem))
            .await
            .map_err(|_| {
                warn!(?deadline, "deadline elapsed before the schedule was ready");
                SchedulingError::Cancelled
            })?
    }

    /// A request that can be cancelled from elsewhere through the returned handle.
    pub fn cancellable(
        &self,
        problem: Arc<SchedulingProblem>,
    ) -> (impl Future<Output = Result<Schedule>> + Send + 'static, AbortHandle) {
        let (handle, registration) = AbortHandle::new_pair();
        let scheduler = self.clone();
        let request = Abortable::new(
            async move { scheduler.optimize_async(&problem).await },
            registration,
        );
        let future = async move {
            match request.await {
                Ok(outcome) => outcome,
                Err(_aborted) => Err(SchedulingError::Cancelled),
            }
        };
        (future, handle)
    }

    async fn solve_blocking(&self, model: &ScheduleModel) -> Result<Solution> {
        let solver = Arc::clone(&self.solver);
        let formulation = model.shared_formulation();
        let config = self.config.solver.clone();

        tokio::task::spawn_blocking(move || solver.solve(&formulation, &config))
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    SchedulingError::Cancelled
                } else {
                    SchedulingError::Solver(e.to_string())
                }
            })?
            .map_err(SchedulingError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Formulation, Resource, SolverConfig, Task};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        status: SolutionStatus,
    }

    impl Counting {
        fn returning(status: SolutionStatus) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                status,
            })
        }
    }

    impl SolverService for Counting {
        fn solve(
            &self,
            _formulation: &Formulation,
            _config: &SolverConfig,
        ) -> crate::domain::Result<Solution> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Solution::new(self.status, "scripted"))
        }

        fn name(&self) -> &str {
            "counting"
        }

        fn supports_mip(&self) -> bool {
            true
        }
    }

    fn one_task() -> SchedulingProblem {
        SchedulingProblem::new(
            vec![Task::new("a", 2.0, "m")],
            vec![Resource::new("m")],
        )
        .unwrap()
    }

    #[test]
    fn test_lifecycle_transitions() {
        let state = RequestState::Building;
        let state = state.transition(RequestState::Solving).unwrap();
        let state = state.transition(RequestState::Interpreting).unwrap();
        let state = state.transition(RequestState::Done).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        assert!(RequestState::Building
            .transition(RequestState::Interpreting)
            .is_err());
        assert!(RequestState::Solving.transition(RequestState::Done).is_err());
        assert!(RequestState::Done.transition(RequestState::Building).is_err());

        let failed = RequestState::Failed {
            stage: Stage::Solving,
            reason: "x".into(),
        };
        assert!(failed
            .transition(RequestState::Failed {
                stage: Stage::Solving,
                reason: "y".into()
            })
            .is_err());
    }

    #[test]
    fn test_any_running_state_can_fail() {
        for state in [
            RequestState::Building,
            RequestState::Solving,
            RequestState::Interpreting,
        ] {
            let stage = state.stage().unwrap();
            let failed = state
                .transition(RequestState::Failed {
                    stage,
                    reason: "boom".into(),
                })
                .unwrap();
            assert!(failed.is_terminal());
        }
    }

    #[test]
    fn test_error_stage_and_status() {
        let infeasible = SchedulingError::Infeasible("no".into());
        assert_eq!(infeasible.stage(), Stage::Solving);
        assert_eq!(infeasible.status(), SolutionStatus::Infeasible);

        let timed_out = SchedulingError::TimedOut("late".into());
        assert_eq!(timed_out.status(), SolutionStatus::Timeout);

        let formulation = SchedulingError::from(FormulationError::UnboundedHorizon);
        assert_eq!(formulation.stage(), Stage::Building);
        assert_eq!(formulation.status(), SolutionStatus::Error);
    }

    #[test]
    fn test_empty_problem_skips_solver() {
        let solver = Counting::returning(SolutionStatus::Optimal);
        let scheduler = Scheduler::new(solver.clone(), SchedulerConfig::default());
        let problem = SchedulingProblem::new(vec![], vec![]).unwrap();

        let schedule = scheduler.optimize(&problem).unwrap();
        assert!(schedule.is_empty());
        assert_eq!(schedule.status, SolutionStatus::Optimal);
        assert_eq!(solver.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_statuses_become_errors() {
        let cases = [
            (SolutionStatus::Infeasible, SolutionStatus::Infeasible),
            (SolutionStatus::Timeout, SolutionStatus::Timeout),
            (SolutionStatus::Error, SolutionStatus::Error),
        ];
        for (returned, reported) in cases {
            let solver = Counting::returning(returned);
            let scheduler = Scheduler::new(solver.clone(), SchedulerConfig::default());
            let err = scheduler.optimize(&one_task()).unwrap_err();
            assert_eq!(err.status(), reported);
            assert_eq!(err.stage(), Stage::Solving);
            assert_eq!(solver.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_optimal_without_values_is_an_error() {
        let solver = Counting::returning(SolutionStatus::Optimal);
        let scheduler = Scheduler::new(solver, SchedulerConfig::default());
        let err = scheduler.optimize(&one_task()).unwrap_err();
        assert!(matches!(err, SchedulingError::Solver(_)));
    }

    #[test]
    fn test_invalid_config_fails_before_solving() {
        let solver = Counting::returning(SolutionStatus::Optimal);
        let config = SchedulerConfig::default().with_time_limit(0.0);
        let scheduler = Scheduler::new(solver.clone(), config);

        let err = scheduler.optimize(&one_task()).unwrap_err();
        assert!(matches!(err, SchedulingError::Config(_)));
        assert_eq!(err.stage(), Stage::Building);
        assert_eq!(solver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_abort_yields_cancelled() {
        let solver = Counting::returning(SolutionStatus::Infeasible);
        let scheduler = Scheduler::new(solver, SchedulerConfig::default());
        let (request, handle) = scheduler.cancellable(Arc::new(one_task()));
        handle.abort();
        assert!(matches!(request.await, Err(SchedulingError::Cancelled)));
    }
}
