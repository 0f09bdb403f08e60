// Scheduler configuration.
//
// Every field has a default, so a configuration file only needs the values
// it changes.

use crate::domain::{ObjectiveKind, SolverConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How the builder bounds otherwise unbounded time variables
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizonPolicy {
    /// Latest lower time bound plus the sum of all durations
    #[default]
    Derived,
    /// A caller-supplied bound
    Fixed(f64),
    /// The latest task deadline or resource availability end
    Deadlines,
}

/// Options of the model builder
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub objective: ObjectiveKind,
    pub horizon: HorizonPolicy,
    /// Use integer rather than continuous start-time variables
    pub integral_times: bool,
}

/// Configuration of one scheduler instance
///
/// ```
/// use taskopt::application::{HorizonPolicy, SchedulerConfig};
/// use taskopt::ObjectiveKind;
///
/// let config = SchedulerConfig::from_toml_str(r#"
///     epsilon = 1e-5
///
///     [solver]
///     backend = "highs"
///     time_limit_seconds = 5.0
///
///     [model]
///     objective = "weighted_tardiness"
///     horizon = { fixed = 120.0 }
/// "#).unwrap();
///
/// assert_eq!(config.solver.time_limit_seconds, 5.0);
/// assert_eq!(config.model.objective, ObjectiveKind::WeightedTardiness);
/// assert_eq!(config.model.horizon, HorizonPolicy::Fixed(120.0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub solver: SolverConfig,
    pub model: ModelConfig,
    /// Slack tolerated when re-validating a decoded schedule
    pub epsilon: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            model: ModelConfig::default(),
            epsilon: 1e-6,
        }
    }
}

impl SchedulerConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_objective(mut self, objective: ObjectiveKind) -> Self {
        self.model.objective = objective;
        self
    }

    pub fn with_horizon(mut self, horizon: HorizonPolicy) -> Self {
        self.model.horizon = horizon;
        self
    }

    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.solver.time_limit_seconds = seconds;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let limit = self.solver.time_limit_seconds;
        if !(limit.is_finite() && limit > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "time_limit_seconds must be a positive number, got {}",
                limit
            )));
        }
        let gap = self.solver.optimality_gap_tolerance;
        if !(gap.is_finite() && gap >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "optimality_gap_tolerance must be >= 0, got {}",
                gap
            )));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "epsilon must be a positive number, got {}",
                self.epsilon
            )));
        }
        if let HorizonPolicy::Fixed(h) = self.model.horizon {
            if !(h.is_finite() && h > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "fixed horizon must be a positive number, got {}",
                    h
                )));
            }
        }
        Ok(())
    }
}
