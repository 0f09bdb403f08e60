use crate::domain::{
    solver_service::{Result, SolverService},
    value_objects::SolverBackend,
};
#[cfg(feature = "good_lp")]
use crate::solver::CoinCbcSolver;
#[cfg(feature = "highs")]
use crate::solver::HighsSolver;
use std::sync::Arc;

/// Factory for creating solver instances based on configuration
pub struct SolverFactory;

impl SolverFactory {
    /// Create a solver for a specific backend
    ///
    /// `Auto` prefers HiGHS and falls back to CBC.
    pub fn create_from_backend(backend: SolverBackend) -> Result<Arc<dyn SolverService>> {
        Self::boxed_from_backend(backend).map(Arc::from)
    }

    /// Owned instance, for callers that keep their own instances (the pool)
    pub fn boxed_from_backend(backend: SolverBackend) -> Result<Box<dyn SolverService>> {
        match backend {
            SolverBackend::Auto => Self::highs().or_else(|_| Self::coin_cbc()),
            SolverBackend::CoinCbc => Self::coin_cbc(),
            SolverBackend::Highs => Self::highs(),
        }
    }

    /// Get the default solver (HiGHS when compiled in)
    pub fn default_solver() -> Result<Arc<dyn SolverService>> {
        Self::create_from_backend(SolverBackend::Auto)
    }

    /// Backends compiled into this build
    pub fn available_backends() -> Vec<SolverBackend> {
        [SolverBackend::Highs, SolverBackend::CoinCbc]
            .into_iter()
            .filter(|&backend| Self::create_from_backend(backend).is_ok())
            .collect()
    }

    #[cfg(feature = "highs")]
    fn highs() -> Result<Box<dyn SolverService>> {
        Ok(Box::new(HighsSolver::new()))
    }

    #[cfg(not(feature = "highs"))]
    fn highs() -> Result<Box<dyn SolverService>> {
        Err(crate::domain::SolverError::SolverNotAvailable(
            "HiGHS support not compiled in (enable the `highs` feature)".to_string(),
        ))
    }

    #[cfg(feature = "good_lp")]
    fn coin_cbc() -> Result<Box<dyn SolverService>> {
        Ok(Box::new(CoinCbcSolver::new()))
    }

    #[cfg(not(feature = "good_lp"))]
    fn coin_cbc() -> Result<Box<dyn SolverService>> {
        Err(crate::domain::SolverError::SolverNotAvailable(
            "COIN-OR CBC support not compiled in (enable the `good_lp` feature)".to_string(),
        ))
    }
}
