// Infrastructure: a fixed set of solver instances handed out one request at a time
//
// A lease owns its solver instance until dropped, so no two in-flight solves
// ever share an instance.

use std::ops::Deref;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::application::scheduler::{self, SchedulingError};
use crate::application::SchedulerConfig;
use crate::domain::solver_service::{Result, SolverError, SolverService};
use crate::domain::value_objects::SolverBackend;
use crate::domain::{Schedule, SchedulingProblem};
use crate::solver::SolverFactory;

struct PoolInner {
    idle: Mutex<Vec<Box<dyn SolverService>>>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl PoolInner {
    fn take(&self) -> Option<Box<dyn SolverService>> {
        self.idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop()
    }

    fn give_back(&self, solver: Box<dyn SolverService>) {
        self.idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(solver);
    }
}

/// Pool of solver instances with scoped acquisition
#[derive(Clone)]
pub struct SolverPool {
    inner: Arc<PoolInner>,
}

impl SolverPool {
    pub fn new(solvers: Vec<Box<dyn SolverService>>) -> Self {
        let size = solvers.len();
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(solvers),
                permits: Arc::new(Semaphore::new(size)),
                size,
            }),
        }
    }

    /// Builds `size` instances of `backend`.
    pub fn with_backend(backend: SolverBackend, size: usize) -> Result<Self> {
        let solvers = (0..size)
            .map(|_| SolverFactory::boxed_from_backend(backend))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(solvers))
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Instances not currently leased
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Waits for a free instance.
    pub async fn acquire(&self) -> Result<SolverLease> {
        if self.inner.size == 0 {
            return Err(SolverError::SolverNotAvailable(
                "solver pool is empty".to_string(),
            ));
        }
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|e| SolverError::SolverNotAvailable(e.to_string()))?;
        Ok(self.lease(permit))
    }

    /// Takes a free instance without waiting.
    pub fn try_acquire(&self) -> Option<SolverLease> {
        let permit = Arc::clone(&self.inner.permits).try_acquire_owned().ok()?;
        Some(self.lease(permit))
    }

    fn lease(&self, permit: OwnedSemaphorePermit) -> SolverLease {
        // A permit guarantees an idle instance
        let solver = self.inner.take();
        debug!(available = self.available(), "solver leased");
        SolverLease {
            solver,
            pool: Arc::clone(&self.inner),
            _permit: permit,
        }
    }
}

/// Exclusive use of one pooled solver; returned to the pool on drop
pub struct SolverLease {
    solver: Option<Box<dyn SolverService>>,
    pool: Arc<PoolInner>,
    // Dropped after the solver is back in the pool
    _permit: OwnedSemaphorePermit,
}

impl Deref for SolverLease {
    type Target = dyn SolverService;

    fn deref(&self) -> &Self::Target {
        match &self.solver {
            Some(solver) => solver.as_ref(),
            None => unreachable!("lease used after release"),
        }
    }
}

impl Drop for SolverLease {
    fn drop(&mut self) {
        if let Some(solver) = self.solver.take() {
            self.pool.give_back(solver);
        }
    }
}

/// Runs each request on its own pooled solver instance
#[derive(Clone)]
pub struct PooledScheduler {
    pool: SolverPool,
    config: Arc<SchedulerConfig>,
}

impl PooledScheduler {
    pub fn new(pool: SolverPool, config: SchedulerConfig) -> Self {
        Self {
            pool,
            config: Arc::new(config),
        }
    }

    /// A pool of `size` instances of the configured backend.
    pub fn from_config(config: SchedulerConfig, size: usize) -> Result<Self> {
        let pool = SolverPool::with_backend(config.solver.backend, size)?;
        Ok(Self::new(pool, config))
    }

    pub fn pool(&self) -> &SolverPool {
        &self.pool
    }

    /// Waits for a free instance, then runs the pipeline on a blocking thread.
    pub async fn optimize(
        &self,
        problem: Arc<SchedulingProblem>,
    ) -> std::result::Result<Schedule, SchedulingError> {
        let lease = self.pool.acquire().await?;
        let config = Arc::clone(&self.config);

        tokio::task::spawn_blocking(move || scheduler::optimize_with(&*lease, &config, &problem))
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    SchedulingError::Cancelled
                } else {
                    SchedulingError::Solver(e.to_string())
                }
            })?
    }
}
