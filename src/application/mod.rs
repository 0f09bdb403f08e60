// Application layer: the scheduling use case and its configuration

pub mod config;
pub mod interpreter;
pub mod model_builder;
pub mod scheduler;

pub use config::{ConfigError, HorizonPolicy, ModelConfig, SchedulerConfig};
pub use interpreter::{validate_schedule, SolutionInterpreter, ValidationError, ViolatedConstraint};
pub use model_builder::{
    Assignment, FormulationError, Lane, ModelBuilder, ScheduleModel, TaskVariables,
};
pub use scheduler::{IllegalTransition, RequestState, Scheduler, SchedulingError, Stage};
