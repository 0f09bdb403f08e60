// COIN-OR CBC Solver Adapter
// Translates a formulation into a good_lp model solved by CBC

use crate::domain::{
    models::{
        Formulation, Solution as DomainSolution, SolutionQuality, SolverConfig, SolverStatistics,
    },
    solver_service::{Result, SolverService},
    value_objects::{
        ConstraintType, OptimizationType, SolutionStatus as DomainSolutionStatus, VariableType,
    },
};
use good_lp::{
    solvers::coin_cbc, variable, variables, Expression, ResolutionError,
    Solution as GoodLpSolutionTrait, SolverModel, Variable as GoodLpVariable,
};
use std::time::Instant;
use tracing::{debug, warn};

/// Row violation above which an incumbent is not trusted as feasible
const FEASIBILITY_TOLERANCE: f64 = 1e-5;

pub struct CoinCbcSolver;

impl CoinCbcSolver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CoinCbcSolver {
    fn default() -> Self {
        Self::new()
    }
}

fn terms_expression(terms: &[(usize, f64)], vars: &[GoodLpVariable]) -> Expression {
    let mut expr: Expression = 0.into();
    for &(i, coeff) in terms {
        if coeff != 0.0 {
            expr += coeff * vars[i];
        }
    }
    expr
}

impl SolverService for CoinCbcSolver {
    fn solve(&self, formulation: &Formulation, config: &SolverConfig) -> Result<DomainSolution> {
        self.validate(formulation)?;

        let start_time = Instant::now();

        let mut vars = variables!();
        let mut lp_variables: Vec<GoodLpVariable> = Vec::with_capacity(formulation.num_variables());

        for var_def in &formulation.variables {
            let lower = var_def.lower_bound;
            let upper = var_def.upper_bound.unwrap_or(f64::INFINITY);

            let var = match var_def.variable_type {
                VariableType::Binary => vars.add(variable().binary()),
                VariableType::Integer => vars.add(variable().integer().min(lower).max(upper)),
                VariableType::Continuous => vars.add(variable().min(lower).max(upper)),
            };
            lp_variables.push(var);
        }

        // good_lp minimises, so negate for maximisation
        let is_maximize = formulation.objective.optimization_type == OptimizationType::Maximize;
        let sign = if is_maximize { -1.0 } else { 1.0 };
        let objective: Vec<(usize, f64)> = formulation
            .objective
            .terms
            .iter()
            .map(|&(i, c)| (i, sign * c))
            .collect();
        let obj_expr = terms_expression(&objective, &lp_variables);

        let mut lp_model = vars.minimise(obj_expr).using(coin_cbc::coin_cbc);
        lp_model.set_parameter("log", if config.verbose { "1" } else { "0" });
        lp_model.set_parameter("seconds", &config.time_limit_seconds.to_string());
        lp_model.set_parameter("ratioGap", &config.optimality_gap_tolerance.to_string());

        for constraint in &formulation.constraints {
            let lhs = terms_expression(&constraint.terms, &lp_variables);
            lp_model = match constraint.constraint_type {
                ConstraintType::LessThanOrEqual => lp_model.with(lhs.leq(constraint.bound)),
                ConstraintType::Equal => lp_model.with(lhs.eq(constraint.bound)),
                ConstraintType::GreaterThanOrEqual => lp_model.with(lhs.geq(constraint.bound)),
            };
        }

        let solution_result = lp_model.solve();
        let elapsed = start_time.elapsed().as_secs_f64();
        let statistics = SolverStatistics::for_formulation(formulation, elapsed * 1000.0);
        let hit_limit = elapsed >= config.time_limit_seconds;

        match solution_result {
            Ok(sol) => {
                let variable_values: Vec<f64> =
                    lp_variables.iter().map(|&var| sol.value(var)).collect();
                let quality = SolutionQuality::measure(formulation, &variable_values);

                // CBC hands back its incumbent when stopped on the time limit
                let status = if hit_limit {
                    DomainSolutionStatus::Timeout
                } else if config.optimality_gap_tolerance > 0.0 {
                    DomainSolutionStatus::Feasible
                } else {
                    DomainSolutionStatus::Optimal
                };

                if quality.max_constraint_violation > FEASIBILITY_TOLERANCE {
                    warn!(
                        violation = quality.max_constraint_violation,
                        "CBC returned an assignment that violates the formulation"
                    );
                    if hit_limit {
                        return Ok(DomainSolution::new(
                            DomainSolutionStatus::Timeout,
                            "Time limit reached without a feasible incumbent",
                        )
                        .with_statistics(statistics));
                    }
                }

                let value = formulation.objective.evaluate(&variable_values);
                debug!(%status, value, "CBC finished");
                Ok(DomainSolution::with_values(status, value, variable_values)
                    .with_statistics(statistics)
                    .with_quality(quality)
                    .with_message(format!("{} solution found for '{}'", status, formulation.name)))
            }
            Err(ResolutionError::Infeasible) => Ok(DomainSolution::new(
                DomainSolutionStatus::Infeasible,
                "Problem is infeasible: no solution satisfies all constraints",
            )
            .with_statistics(statistics)),
            Err(ResolutionError::Unbounded) => Ok(DomainSolution::new(
                DomainSolutionStatus::Error,
                "Problem is unbounded: objective can be improved infinitely",
            )
            .with_statistics(statistics)),
            Err(e) if hit_limit => Ok(DomainSolution::new(
                DomainSolutionStatus::Timeout,
                format!("Time limit reached: {:?}", e),
            )
            .with_statistics(statistics)),
            Err(e) => {
                warn!(error = ?e, "CBC stopped without a solution");
                Ok(DomainSolution::new(
                    DomainSolutionStatus::Error,
                    format!("CBC failed: {:?}", e),
                )
                .with_statistics(statistics))
            }
        }
    }

    fn name(&self) -> &str {
        "COIN-OR CBC"
    }

    fn supports_mip(&self) -> bool {
        true
    }
}
