// Infrastructure layer: sharing solver instances across concurrent requests

pub mod pool;

pub use pool::{PooledScheduler, SolverLease, SolverPool};
