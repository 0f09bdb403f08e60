// HiGHS Solver Adapter
// Implements the SolverService interface for HiGHS
// This is an adapter pattern - translates a formulation to the HiGHS row API

use crate::domain::{
    models::{
        Formulation, Solution as DomainSolution, SolutionQuality, SolverConfig, SolverStatistics,
    },
    solver_service::{Result, SolverService},
    value_objects::{
        ConstraintType, OptimizationType, SolutionStatus as DomainSolutionStatus, VariableType,
    },
};
use highs::{HighsModelStatus, RowProblem, Sense};
use std::time::Instant;
use tracing::{debug, warn};

/// Violation above which an incumbent is not trusted as feasible
const FEASIBILITY_TOLERANCE: f64 = 1e-5;

pub struct HighsSolver;

impl HighsSolver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HighsSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SolverService for HighsSolver {
    fn solve(&self, formulation: &Formulation, config: &SolverConfig) -> Result<DomainSolution> {
        self.validate(formulation)?;

        let start_time = Instant::now();
        let num_vars = formulation.num_variables();

        let mut obj_coeffs = vec![0.0; num_vars];
        for &(i, coeff) in &formulation.objective.terms {
            obj_coeffs[i] += coeff;
        }

        // Columns first, then rows
        let mut pb = RowProblem::default();
        let mut cols = Vec::with_capacity(num_vars);
        for (var_def, &obj_coeff) in formulation.variables.iter().zip(&obj_coeffs) {
            let lower = var_def.lower_bound;
            let upper = var_def.upper_bound.unwrap_or(f64::INFINITY);

            let col = match var_def.variable_type {
                VariableType::Integer | VariableType::Binary => {
                    pb.add_integer_column(obj_coeff, lower..=upper)
                }
                VariableType::Continuous => pb.add_column(obj_coeff, lower..=upper),
            };
            cols.push(col);
        }

        for constraint in &formulation.constraints {
            let terms: Vec<_> = constraint
                .terms
                .iter()
                .filter(|&&(_, coeff)| coeff != 0.0)
                .map(|&(i, coeff)| (cols[i], coeff))
                .collect();

            match constraint.constraint_type {
                ConstraintType::LessThanOrEqual => {
                    pb.add_row(..=constraint.bound, &terms);
                }
                ConstraintType::Equal => {
                    pb.add_row(constraint.bound..=constraint.bound, &terms);
                }
                ConstraintType::GreaterThanOrEqual => {
                    pb.add_row(constraint.bound.., &terms);
                }
            }
        }

        let sense = if formulation.objective.optimization_type == OptimizationType::Maximize {
            Sense::Maximise
        } else {
            Sense::Minimise
        };

        let mut model = pb.optimise(sense);
        model.set_option("output_flag", config.verbose);
        model.set_option("time_limit", config.time_limit_seconds);
        model.set_option("mip_rel_gap", config.optimality_gap_tolerance);

        let solved = model.try_solve();
        let elapsed = start_time.elapsed().as_secs_f64();
        let statistics = SolverStatistics::for_formulation(formulation, elapsed * 1000.0);
        let hit_limit = elapsed >= config.time_limit_seconds;

        let solved = match solved {
            Ok(solved) => solved,
            Err(status) => {
                warn!(?status, "HiGHS refused to solve");
                return Ok(DomainSolution::new(
                    DomainSolutionStatus::Error,
                    format!("HiGHS failed to run: {:?}", status),
                )
                .with_statistics(statistics));
            }
        };

        let model_status = solved.status();
        debug!(?model_status, "HiGHS finished");

        match model_status {
            HighsModelStatus::Optimal => {
                let variable_values = solved.get_solution().columns().to_vec();
                let quality = SolutionQuality::measure(formulation, &variable_values);
                let value = formulation.objective.evaluate(&variable_values);
                let status = if config.optimality_gap_tolerance > 0.0 {
                    DomainSolutionStatus::Feasible
                } else {
                    DomainSolutionStatus::Optimal
                };

                Ok(DomainSolution::with_values(status, value, variable_values)
                    .with_statistics(statistics)
                    .with_quality(quality)
                    .with_message(format!("{} solution found for '{}'", status, formulation.name)))
            }
            HighsModelStatus::ReachedTimeLimit => {
                let variable_values = solved.get_solution().columns().to_vec();
                let quality = SolutionQuality::measure(formulation, &variable_values);
                let has_incumbent = variable_values.len() == num_vars
                    && quality.max_constraint_violation <= FEASIBILITY_TOLERANCE
                    && quality.max_integrality_violation <= FEASIBILITY_TOLERANCE;

                if has_incumbent {
                    let value = formulation.objective.evaluate(&variable_values);
                    Ok(DomainSolution::with_values(
                        DomainSolutionStatus::Timeout,
                        value,
                        variable_values,
                    )
                    .with_statistics(statistics)
                    .with_quality(quality)
                    .with_message("Time limit reached with a feasible incumbent"))
                } else {
                    Ok(DomainSolution::new(
                        DomainSolutionStatus::Timeout,
                        "Time limit reached without a feasible incumbent",
                    )
                    .with_statistics(statistics))
                }
            }
            HighsModelStatus::Infeasible => Ok(DomainSolution::new(
                DomainSolutionStatus::Infeasible,
                "Problem is infeasible: no solution satisfies all constraints",
            )
            .with_statistics(statistics)),
            // With every column boxed the objective cannot be unbounded
            HighsModelStatus::UnboundedOrInfeasible
                if formulation
                    .variables
                    .iter()
                    .all(|v| v.upper_bound.is_some_and(f64::is_finite)) =>
            {
                Ok(DomainSolution::new(
                    DomainSolutionStatus::Infeasible,
                    "Problem is infeasible: no solution satisfies all constraints",
                )
                .with_statistics(statistics))
            }
            HighsModelStatus::Unbounded | HighsModelStatus::UnboundedOrInfeasible => {
                Ok(DomainSolution::new(
                    DomainSolutionStatus::Error,
                    "Problem is unbounded or infeasible: the formulation is degenerate",
                )
                .with_statistics(statistics))
            }
            status if hit_limit => Ok(DomainSolution::new(
                DomainSolutionStatus::Timeout,
                format!("Time limit reached with HiGHS status {:?}", status),
            )
            .with_statistics(statistics)),
            status => Ok(DomainSolution::new(
                DomainSolutionStatus::Error,
                format!("HiGHS solver returned status: {:?}", status),
            )
            .with_statistics(statistics)),
        }
    }

    fn name(&self) -> &str {
        "HiGHS"
    }

    fn supports_mip(&self) -> bool {
        true
    }
}
