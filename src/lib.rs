// Domain layer: scheduling problems, schedules and the solver contract
pub mod domain;

// Application layer: formulation, interpretation and the scheduling facade
pub mod application;

// Infrastructure layer: solver pooling for concurrent callers
pub mod infrastructure;

// Solver adapters: Concrete implementations of SolverService
pub mod solver;

// Re-export commonly used types
pub use domain::{
    ObjectiveKind, ProblemDescription, ProblemError, Resource, ResourceRequirement, Schedule,
    ScheduleEntry, SchedulingProblem, Solution, SolutionStatus, SolverBackend, SolverConfig,
    SolverError, SolverService, Task, TaskGenerator, TimeWindow,
};

pub use application::{
    HorizonPolicy, ModelBuilder, Scheduler, SchedulerConfig, SchedulingError, ValidationError,
};

pub use infrastructure::{PooledScheduler, SolverPool};

pub use solver::SolverFactory;
#[cfg(feature = "good_lp")]
pub use solver::CoinCbcSolver;
#[cfg(feature = "highs")]
pub use solver::HighsSolver;
