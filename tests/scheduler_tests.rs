mod common;

use common::{a_then_b, two_tasks, ScriptedSolver};
use std::sync::Arc;
use std::time::Duration;
use taskopt::application::{Stage, ViolatedConstraint};
use taskopt::{
    ProblemDescription, ProblemError, Resource, Scheduler, SchedulerConfig, SchedulingError,
    SchedulingProblem, SolutionStatus, Task,
};

fn scheduler(solver: Arc<ScriptedSolver>) -> Scheduler {
    Scheduler::new(solver, SchedulerConfig::default())
}

#[test]
fn test_two_tasks_decode_to_makespan_seven() {
    let solver = a_then_b().shared();
    let schedule = scheduler(solver.clone()).optimize(&two_tasks()).unwrap();

    assert_eq!(solver.calls(), 1);
    assert_eq!(schedule.status, SolutionStatus::Optimal);
    assert_eq!(schedule.len(), 2);
    assert_eq!(schedule.makespan(), 7.0);

    let b = schedule.entry("B").unwrap();
    assert_eq!(b.resource_id, "M");
    assert_eq!(b.start, 3.0);
    assert_eq!(b.end, 7.0);
}

#[test]
fn test_overlapping_answer_fails_validation() {
    let solver = ScriptedSolver::with_values(&[
        ("start[A]", 0.0),
        ("start[B]", 1.0),
        ("makespan", 5.0),
    ])
    .shared();

    let err = scheduler(solver).optimize(&two_tasks()).unwrap_err();
    assert_eq!(err.stage(), Stage::Interpreting);
    match err {
        SchedulingError::Validation(e) => {
            assert!(matches!(e.violated_constraint, ViolatedConstraint::Capacity { .. }));
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
fn test_cycle_rejected_before_solving() {
    let description = ProblemDescription {
        tasks: vec![
            Task::new("A", 1.0, "M").with_predecessor("B"),
            Task::new("B", 1.0, "M").with_predecessor("A"),
        ],
        resources: vec![Resource::new("M")],
        horizon: None,
    };
    let solver = a_then_b().shared();

    let err = scheduler(solver.clone())
        .optimize_description(description)
        .unwrap_err();
    assert!(matches!(
        err,
        SchedulingError::Problem(ProblemError::CyclicPrecedence { .. })
    ));
    assert_eq!(err.stage(), Stage::Building);
    assert_eq!(solver.calls(), 0);
}

#[test]
fn test_infeasible_propagates() {
    let solver = ScriptedSolver::returning(SolutionStatus::Infeasible).shared();
    let err = scheduler(solver).optimize(&two_tasks()).unwrap_err();
    assert!(matches!(err, SchedulingError::Infeasible(_)));
    assert_eq!(err.status(), SolutionStatus::Infeasible);
}

#[test]
fn test_timeout_without_values() {
    let solver = ScriptedSolver::returning(SolutionStatus::Timeout).shared();
    let err = scheduler(solver).optimize(&two_tasks()).unwrap_err();
    assert!(matches!(err, SchedulingError::TimedOut(_)));
    assert_eq!(err.status(), SolutionStatus::Timeout);
}

#[test]
fn test_timeout_with_incumbent_is_kept() {
    let solver = a_then_b().with_status(SolutionStatus::Timeout).shared();
    let schedule = scheduler(solver).optimize(&two_tasks()).unwrap();
    assert_eq!(schedule.status, SolutionStatus::Timeout);
    assert_eq!(schedule.makespan(), 7.0);
}

#[test]
fn test_solver_error_status() {
    let solver = ScriptedSolver::returning(SolutionStatus::Error).shared();
    let err = scheduler(solver).optimize(&two_tasks()).unwrap_err();
    assert!(matches!(err, SchedulingError::Solver(_)));
    assert_eq!(err.status(), SolutionStatus::Error);
}

#[test]
fn test_empty_problem() {
    let solver = a_then_b().shared();
    let problem = SchedulingProblem::new(vec![], vec![Resource::new("M")]).unwrap();
    let schedule = scheduler(solver.clone()).optimize(&problem).unwrap();
    assert!(schedule.is_empty());
    assert!(schedule.is_optimal());
    assert_eq!(solver.calls(), 0);
}

#[test]
fn test_description_from_json() {
    let json = r#"{
        "tasks": [
            {"id": "A", "duration": 3.0, "requirement": {"resource": "M"}},
            {"id": "B", "duration": 4.0, "requirement": {"resource": "M"}, "due_date": 10.0}
        ],
        "resources": [{"id": "M"}]
    }"#;
    let description: ProblemDescription = serde_json::from_str(json).unwrap();
    assert_eq!(description.resources[0].capacity, 1);
    assert_eq!(description.tasks[1].weight, 1.0);

    let schedule = scheduler(a_then_b().shared())
        .optimize_description(description)
        .unwrap();
    let b = schedule.entry("B").unwrap();
    assert_eq!(b.on_time, Some(true));
    assert_eq!(b.tardiness, 0.0);
}

#[test]
fn test_unknown_resource_in_description() {
    let description = ProblemDescription {
        tasks: vec![Task::new("A", 1.0, "missing")],
        resources: vec![Resource::new("M")],
        horizon: None,
    };
    let err = scheduler(a_then_b().shared())
        .optimize_description(description)
        .unwrap_err();
    assert!(matches!(
        err,
        SchedulingError::Problem(ProblemError::UnknownResource { .. })
    ));
}

#[test]
fn test_repeated_calls_agree() {
    let scheduler = scheduler(a_then_b().shared());
    let problem = two_tasks();
    let first = scheduler.optimize(&problem).unwrap();
    let second = scheduler.optimize(&problem).unwrap();
    assert_eq!(first.makespan(), second.makespan());
    assert_eq!(first.entries, second.entries);
}

#[tokio::test]
async fn test_async_matches_sync() {
    let scheduler = scheduler(a_then_b().shared());
    let problem = two_tasks();
    let schedule = scheduler.optimize_async(&problem).await.unwrap();
    assert_eq!(schedule, scheduler.optimize(&problem).unwrap());
}

#[tokio::test]
async fn test_deadline_cancels_slow_solve() {
    let solver = a_then_b().sleeping(Duration::from_millis(500)).shared();
    let err = scheduler(solver)
        .optimize_with_deadline(&two_tasks(), Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulingError::Cancelled));
}

#[tokio::test]
async fn test_deadline_not_reached() {
    let schedule = scheduler(a_then_b().shared())
        .optimize_with_deadline(&two_tasks(), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(schedule.makespan(), 7.0);
}
