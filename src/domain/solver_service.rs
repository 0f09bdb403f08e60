// Domain service interface for solving formulations
// Any MILP backend satisfying this contract can be plugged into the scheduler

use super::models::{Formulation, Solution, SolverConfig};

/// Error types for the solver service
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("Invalid problem: {0}")]
    InvalidProblem(String),

    #[error("Solver not available: {0}")]
    SolverNotAvailable(String),

    #[error("Solver execution failed: {0}")]
    ExecutionFailed(String),
}

pub type Result<T> = std::result::Result<T, SolverError>;

/// Domain service interface for optimization solvers
///
/// Infeasibility, unboundedness and time limits are reported through
/// [`Solution::status`]; an `Err` means the formulation was malformed or the
/// engine could not run at all.
pub trait SolverService: Send + Sync {
    /// Solve a formulation within the limits of `config`
    fn solve(&self, formulation: &Formulation, config: &SolverConfig) -> Result<Solution>;

    /// Validate a formulation without solving it
    fn validate(&self, formulation: &Formulation) -> Result<()> {
        let mut errors = Vec::new();
        let num_vars = formulation.num_variables();

        if num_vars == 0 {
            errors.push("Formulation must have at least one variable".to_string());
        }

        for (i, &(var, coeff)) in formulation.objective.terms.iter().enumerate() {
            if var >= num_vars {
                errors.push(format!(
                    "Objective term {} references variable {} but formulation has {} variables",
                    i, var, num_vars
                ));
            }
            if !coeff.is_finite() {
                errors.push(format!("Objective term {} has non-finite coefficient", i));
            }
        }

        for (i, constraint) in formulation.constraints.iter().enumerate() {
            if !constraint.bound.is_finite() {
                errors.push(format!(
                    "Constraint {} '{}' has non-finite bound",
                    i, constraint.name
                ));
            }
            for &(var, coeff) in &constraint.terms {
                if var >= num_vars {
                    errors.push(format!(
                        "Constraint {} '{}' references variable {} but formulation has {} variables",
                        i, constraint.name, var, num_vars
                    ));
                }
                if !coeff.is_finite() {
                    errors.push(format!(
                        "Constraint {} '{}' has non-finite coefficient",
                        i, constraint.name
                    ));
                }
            }
        }

        for (i, var) in formulation.variables.iter().enumerate() {
            if let Some(upper) = var.upper_bound {
                if var.lower_bound > upper {
                    errors.push(format!(
                        "Variable {} '{}' has lower bound ({}) > upper bound ({})",
                        i, var.name, var.lower_bound, upper
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SolverError::InvalidProblem(errors.join("; ")))
        }
    }

    /// Get the name of this solver backend
    fn name(&self) -> &str;

    /// Check if this solver supports mixed-integer programming
    fn supports_mip(&self) -> bool;
}
