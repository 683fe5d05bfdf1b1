//! Error types.
//!
//! Validation problems surface as [`ConfigError`] or [`EngineError`] before
//! any generation runs. Strategy failures during a run are reported as
//! [`StrategyError`] values and recovered locally by the engine.

/// Invalid configuration, identifying the offending field.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("population_size must be at least 1")]
    PopulationSize,
    #[error("generations must be at least 1")]
    Generations,
    #[error("{field} must be in [0, 1], got {value}")]
    Rate { field: &'static str, value: f64 },
    #[error("max_concurrency must be at least 1")]
    MaxConcurrency,
    #[error("evaluation_timeout must be positive or unbounded")]
    EvaluationTimeout,
    #[error("tournament_size must be at least 1")]
    TournamentSize,
    #[error("selection_pressure must be finite and non-negative, got {0}")]
    SelectionPressure(f64),
    #[error("fallback_score must be finite, got {0}")]
    FallbackScore(f64),
    #[error("termination criterion {index} is invalid: {reason}")]
    Termination { index: usize, reason: String },
}

impl ConfigError {
    /// Name of the configuration field this error refers to.
    pub fn field(&self) -> &'static str {
        match self {
            ConfigError::PopulationSize => "population_size",
            ConfigError::Generations => "generations",
            ConfigError::Rate { field, .. } => field,
            ConfigError::MaxConcurrency => "max_concurrency",
            ConfigError::EvaluationTimeout => "evaluation_timeout",
            ConfigError::TournamentSize => "tournament_size",
            ConfigError::SelectionPressure(_) => "selection_pressure",
            ConfigError::FallbackScore(_) => "fallback_score",
            ConfigError::Termination { .. } => "termination",
        }
    }
}

/// Failure to construct an engine or start a run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("initial population is empty")]
    EmptyPopulation,
    #[error("initial population has {actual} entities, population_size is {expected}")]
    PopulationSize { expected: usize, actual: usize },
    #[error("failed to start evaluation worker pool: {0}")]
    WorkerPool(String),
}

/// A single strategy invocation failed.
///
/// Returned by fitness, mutation, and crossover implementations. The engine
/// never aborts a run because of one; it substitutes a fallback and emits a
/// warning instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StrategyError {
    message: String,
}

impl StrategyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for StrategyError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for StrategyError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_names_field() {
        let err = ConfigError::Rate {
            field: "mutation_rate",
            value: f64::NAN,
        };
        assert_eq!(err.field(), "mutation_rate");
        assert!(err.to_string().starts_with("mutation_rate must be in [0, 1]"));
        assert_eq!(ConfigError::MaxConcurrency.field(), "max_concurrency");
    }

    #[test]
    fn test_engine_error_wraps_config() {
        let err: EngineError = ConfigError::PopulationSize.into();
        assert_eq!(
            err.to_string(),
            "invalid configuration: population_size must be at least 1"
        );
    }

    #[test]
    fn test_population_size_error_names_field() {
        let err = EngineError::PopulationSize {
            expected: 10,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "initial population has 3 entities, population_size is 10"
        );
    }

    #[test]
    fn test_strategy_error_message() {
        let err = StrategyError::from("boom");
        assert_eq!(err.message(), "boom");
        assert_eq!(err.to_string(), "boom");
    }
}
