use super::value_objects::{
    ConstraintType, OptimizationType, SolutionStatus, SolverBackend, VariableType,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decision variable in a formulation
#[derive(Debug, Clone)]
pub struct Variable {
    pub variable_type: VariableType,
    pub lower_bound: f64,
    pub upper_bound: Option<f64>,
    pub name: String,
}

impl Variable {
    pub fn continuous(name: impl Into<String>) -> Self {
        Self {
            variable_type: VariableType::Continuous,
            lower_bound: 0.0,
            upper_bound: None,
            name: name.into(),
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self {
            variable_type: VariableType::Integer,
            lower_bound: 0.0,
            upper_bound: None,
            name: name.into(),
        }
    }

    pub fn binary(name: impl Into<String>) -> Self {
        Self {
            variable_type: VariableType::Binary,
            lower_bound: 0.0,
            upper_bound: Some(1.0),
            name: name.into(),
        }
    }

    pub fn with_bounds(mut self, lower: f64, upper: Option<f64>) -> Self {
        self.lower_bound = lower;
        self.upper_bound = upper;
        self
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.variable_type,
            VariableType::Integer | VariableType::Binary
        )
    }
}

/// Objective function to minimize or maximize, as sparse `(variable, coefficient)` terms
#[derive(Debug, Clone)]
pub struct ObjectiveFunction {
    pub optimization_type: OptimizationType,
    pub terms: Vec<(usize, f64)>,
}

impl ObjectiveFunction {
    pub fn new(optimization_type: OptimizationType, terms: Vec<(usize, f64)>) -> Self {
        Self {
            optimization_type,
            terms,
        }
    }

    pub fn minimize(terms: Vec<(usize, f64)>) -> Self {
        Self::new(OptimizationType::Minimize, terms)
    }

    pub fn maximize(terms: Vec<(usize, f64)>) -> Self {
        Self::new(OptimizationType::Maximize, terms)
    }

    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(i, c)| c * values.get(i).copied().unwrap_or(0.0))
            .sum()
    }
}

/// Linear constraint `Σ coeff·x  (≤ | = | ≥)  bound`
#[derive(Debug, Clone)]
pub struct Constraint {
    pub constraint_type: ConstraintType,
    pub terms: Vec<(usize, f64)>,
    pub bound: f64,
    pub name: String,
}

impl Constraint {
    pub fn new(constraint_type: ConstraintType, terms: Vec<(usize, f64)>, bound: f64) -> Self {
        Self {
            constraint_type,
            terms,
            bound,
            name: String::new(),
        }
    }

    pub fn leq(terms: Vec<(usize, f64)>, bound: f64) -> Self {
        Self::new(ConstraintType::LessThanOrEqual, terms, bound)
    }

    pub fn geq(terms: Vec<(usize, f64)>, bound: f64) -> Self {
        Self::new(ConstraintType::GreaterThanOrEqual, terms, bound)
    }

    pub fn eq(terms: Vec<(usize, f64)>, bound: f64) -> Self {
        Self::new(ConstraintType::Equal, terms, bound)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn lhs(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(i, c)| c * values.get(i).copied().unwrap_or(0.0))
            .sum()
    }

    /// How far `values` are from satisfying this row (0 when satisfied)
    pub fn violation(&self, values: &[f64]) -> f64 {
        let lhs = self.lhs(values);
        match self.constraint_type {
            ConstraintType::LessThanOrEqual => (lhs - self.bound).max(0.0),
            ConstraintType::GreaterThanOrEqual => (self.bound - lhs).max(0.0),
            ConstraintType::Equal => (lhs - self.bound).abs(),
        }
    }
}

/// A compiled linear model: named variables, linear rows and one objective.
///
/// Only the model builder mutates a formulation; once handed to a solver it is
/// read-only.
#[derive(Debug, Clone)]
pub struct Formulation {
    pub name: String,
    pub variables: Vec<Variable>,
    pub constraints: Vec<Constraint>,
    pub objective: ObjectiveFunction,
    index: HashMap<String, usize>,
}

impl Formulation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: Vec::new(),
            constraints: Vec::new(),
            objective: ObjectiveFunction::minimize(Vec::new()),
            index: HashMap::new(),
        }
    }

    pub(crate) fn add_variable(&mut self, variable: Variable) -> usize {
        let id = self.variables.len();
        debug_assert!(
            !self.index.contains_key(&variable.name),
            "duplicate variable name {}",
            variable.name
        );
        self.index.insert(variable.name.clone(), id);
        self.variables.push(variable);
        id
    }

    pub(crate) fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub(crate) fn set_objective(&mut self, objective: ObjectiveFunction) {
        self.objective = objective;
    }

    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn num_integer_variables(&self) -> usize {
        self.variables.iter().filter(|v| v.is_integer()).count()
    }

    pub fn num_binary_variables(&self) -> usize {
        self.variables
            .iter()
            .filter(|v| v.variable_type == VariableType::Binary)
            .count()
    }

    pub fn is_mixed_integer(&self) -> bool {
        self.num_integer_variables() > 0
    }

    /// Largest violation of any row or variable bound by `values`
    pub fn max_constraint_violation(&self, values: &[f64]) -> f64 {
        let rows = self
            .constraints
            .iter()
            .map(|c| c.violation(values))
            .fold(0.0, f64::max);

        let bounds = self
            .variables
            .iter()
            .zip(values)
            .map(|(var, &x)| {
                let below = (var.lower_bound - x).max(0.0);
                let above = var.upper_bound.map_or(0.0, |ub| (x - ub).max(0.0));
                below.max(above)
            })
            .fold(0.0, f64::max);

        rows.max(bounds)
    }

    /// Largest distance of an integer variable from the nearest integer
    pub fn max_integrality_violation(&self, values: &[f64]) -> f64 {
        self.variables
            .iter()
            .zip(values)
            .filter(|(var, _)| var.is_integer())
            .map(|(_, &x)| (x - x.round()).abs())
            .fold(0.0, f64::max)
    }
}

/// Configuration for a single solve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub backend: SolverBackend,
    pub time_limit_seconds: f64,
    pub optimality_gap_tolerance: f64,
    pub verbose: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            backend: SolverBackend::Auto,
            time_limit_seconds: 60.0,
            optimality_gap_tolerance: 0.0,
            verbose: false,
        }
    }
}

impl SolverConfig {
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit_seconds = seconds;
        self
    }

    pub fn with_gap_tolerance(mut self, gap: f64) -> Self {
        self.optimality_gap_tolerance = gap;
        self
    }

    pub fn with_backend(mut self, backend: SolverBackend) -> Self {
        self.backend = backend;
        self
    }
}

/// Statistics about the solve process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolverStatistics {
    pub solve_time_ms: f64,
    pub num_variables: u32,
    pub num_constraints: u32,
    pub num_integer_vars: u32,
    pub num_binary_vars: u32,
}

impl SolverStatistics {
    pub fn for_formulation(formulation: &Formulation, solve_time_ms: f64) -> Self {
        Self {
            solve_time_ms,
            num_variables: formulation.num_variables() as u32,
            num_constraints: formulation.num_constraints() as u32,
            num_integer_vars: (formulation.num_integer_variables()
                - formulation.num_binary_variables()) as u32,
            num_binary_vars: formulation.num_binary_variables() as u32,
        }
    }
}

/// Quality metrics for the returned assignment
#[derive(Debug, Clone, Default)]
pub struct SolutionQuality {
    pub max_constraint_violation: f64,
    pub max_integrality_violation: f64,
}

impl SolutionQuality {
    pub fn measure(formulation: &Formulation, values: &[f64]) -> Self {
        Self {
            max_constraint_violation: formulation.max_constraint_violation(values),
            max_integrality_violation: formulation.max_integrality_violation(values),
        }
    }
}

/// Raw solver output: a status and, when one exists, a value per formulation variable
#[derive(Debug, Clone)]
pub struct Solution {
    pub status: SolutionStatus,
    pub objective_value: Option<f64>,
    pub variable_values: Vec<f64>,
    pub message: String,
    pub statistics: SolverStatistics,
    pub quality: SolutionQuality,
}

impl Solution {
    pub fn new(status: SolutionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            objective_value: None,
            variable_values: Vec::new(),
            message: message.into(),
            statistics: SolverStatistics::default(),
            quality: SolutionQuality::default(),
        }
    }

    pub fn optimal(value: f64, variable_values: Vec<f64>) -> Self {
        Self::with_values(SolutionStatus::Optimal, value, variable_values)
    }

    pub fn with_values(status: SolutionStatus, value: f64, variable_values: Vec<f64>) -> Self {
        Self {
            status,
            objective_value: Some(value),
            variable_values,
            message: format!("{} solution found", status),
            statistics: SolverStatistics::default(),
            quality: SolutionQuality::default(),
        }
    }

    pub fn with_statistics(mut self, statistics: SolverStatistics) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn with_quality(mut self, quality: SolutionQuality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn is_optimal(&self) -> bool {
        self.status == SolutionStatus::Optimal
    }

    /// True when the status allows an assignment and one was returned
    pub fn has_values(&self) -> bool {
        self.status.may_have_values() && !self.variable_values.is_empty()
    }

    pub fn value(&self, index: usize) -> Option<f64> {
        self.variable_values.get(index).copied()
    }

    pub fn value_of(&self, formulation: &Formulation, name: &str) -> Option<f64> {
        formulation
            .variable_index(name)
            .and_then(|index| self.value(index))
    }

    /// Variable assignment keyed by variable name
    pub fn named_values(&self, formulation: &Formulation) -> HashMap<String, f64> {
        formulation
            .variables
            .iter()
            .zip(&self.variable_values)
            .map(|(var, &x)| (var.name.clone(), x))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_var_formulation() -> Formulation {
        let mut f = Formulation::new("test");
        let x = f.add_variable(Variable::continuous("x").with_bounds(0.0, Some(10.0)));
        let y = f.add_variable(Variable::binary("y"));
        f.add_constraint(Constraint::leq(vec![(x, 1.0), (y, 5.0)], 8.0).with_name("cap"));
        f.set_objective(ObjectiveFunction::minimize(vec![(x, 1.0)]));
        f
    }

    #[test]
    fn test_variable_lookup_by_name() {
        let f = two_var_formulation();
        assert_eq!(f.variable_index("x"), Some(0));
        assert_eq!(f.variable_index("y"), Some(1));
        assert_eq!(f.variable_index("z"), None);
        assert_eq!(f.num_binary_variables(), 1);
        assert!(f.is_mixed_integer());
    }

    #[test]
    fn test_constraint_violation() {
        let f = two_var_formulation();
        assert_eq!(f.max_constraint_violation(&[3.0, 1.0]), 0.0);
        assert!((f.max_constraint_violation(&[4.0, 1.0]) - 1.0).abs() < 1e-12);
        // bound violation counts too
        assert!((f.max_constraint_violation(&[-2.0, 0.0]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_integrality_violation() {
        let f = two_var_formulation();
        assert!((f.max_integrality_violation(&[0.3, 0.25]) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_named_values() {
        let f = two_var_formulation();
        let solution = Solution::optimal(2.0, vec![2.0, 1.0]);
        assert_eq!(solution.value_of(&f, "y"), Some(1.0));
        let named = solution.named_values(&f);
        assert_eq!(named.get("x"), Some(&2.0));
        assert!(solution.has_values());
    }

    #[test]
    fn test_timeout_without_values() {
        let solution = Solution::new(SolutionStatus::Timeout, "no incumbent");
        assert!(!solution.has_values());
    }
}
