// Domain module: scheduling inputs, the linear formulation and the solver contract

pub mod generator;
pub mod models;
pub mod problem;
pub mod schedule;
pub mod solver_service;
pub mod task;
pub mod value_objects;

pub use generator::*;
pub use models::*;
pub use problem::*;
pub use schedule::*;
pub use solver_service::*;
pub use task::*;
pub use value_objects::*;
