//! Engine configuration.
//!
//! [`EvolutionConfig`] holds all parameters that control the generational
//! loop. [`TerminationCriterion`] describes the optional early-stopping
//! conditions checked before every generation.

use super::error::ConfigError;
use super::selection::SelectionMethod;
use std::time::Duration;

/// Variance below which a window of best scores counts as "no improvement".
pub const NO_IMPROVEMENT_EPSILON: f64 = 1e-6;

/// A condition that ends a run when satisfied.
///
/// Criteria are checked against the most recent generation state before any
/// breeding work is done. Any satisfied criterion stops the run.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TerminationCriterion {
    /// Stop once `n` generations (0 through `n - 1`) have been produced.
    MaxGenerations(usize),

    /// Stop once the best score reaches the target.
    TargetFitness(f64),

    /// Stop when the variance of the last `window` best scores in the
    /// fitness history drops below [`NO_IMPROVEMENT_EPSILON`].
    ///
    /// Does not fire until the history holds at least `window` entries.
    NoImprovement(usize),
}

impl TerminationCriterion {
    /// Checks the criterion against the latest generation.
    ///
    /// `history` is most-recent-first.
    pub fn is_met(&self, generation: usize, best_score: f64, history: &[f64]) -> bool {
        match *self {
            TerminationCriterion::MaxGenerations(n) => generation + 1 >= n,
            TerminationCriterion::TargetFitness(target) => best_score >= target,
            TerminationCriterion::NoImprovement(window) => {
                if window == 0 || history.len() < window {
                    return false;
                }
                variance(&history[..window]) < NO_IMPROVEMENT_EPSILON
            }
        }
    }

    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let reason = match *self {
            TerminationCriterion::MaxGenerations(0) => Some("max_generations must be at least 1"),
            TerminationCriterion::TargetFitness(t) if !t.is_finite() => {
                Some("target_fitness must be finite")
            }
            TerminationCriterion::NoImprovement(w) if w < 2 => {
                Some("no_improvement window must be at least 2")
            }
            _ => None,
        };
        match reason {
            Some(reason) => Err(ConfigError::Termination {
                index,
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

fn variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

/// Configuration for the generation engine.
///
/// # Defaults
///
/// ```
/// use u_evolve::ga::EvolutionConfig;
///
/// let config = EvolutionConfig::default();
/// assert_eq!(config.population_size, 100);
/// assert_eq!(config.generations, 100);
/// ```
///
/// # Builder Pattern
///
/// ```
/// use std::time::Duration;
/// use u_evolve::ga::{EvolutionConfig, TerminationCriterion};
///
/// let config = EvolutionConfig::default()
///     .with_population_size(50)
///     .with_elitism_rate(0.1)
///     .with_mutation_rate(0.05)
///     .with_evaluation_timeout(Duration::from_secs(5))
///     .with_termination(TerminationCriterion::TargetFitness(1.0));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EvolutionConfig {
    /// Number of entities in every bred generation.
    pub population_size: usize,

    /// Generation budget. At most this many states are produced.
    pub generations: usize,

    /// Mutation rate (0.0–1.0), passed to the mutation strategy.
    pub mutation_rate: f64,

    /// Probability of applying crossover to a pair of parents (0.0–1.0).
    ///
    /// When crossover is not applied, both parents pass through unchanged.
    pub crossover_rate: f64,

    /// Fraction of the population carried over as elites (0.0–1.0).
    pub elitism_rate: f64,

    /// Maximum number of fitness evaluations in flight at once.
    pub max_concurrency: usize,

    /// Per-evaluation time limit. `None` waits indefinitely.
    pub evaluation_timeout: Option<Duration>,

    /// Contestants per tournament for [`SelectionMethod::Tournament`].
    pub tournament_size: usize,

    /// Rank-selection exponent. 0 is uniform, 1 is linear ranking.
    pub selection_pressure: f64,

    /// Early-stopping conditions, in addition to `generations`.
    pub termination: Vec<TerminationCriterion>,

    /// Selection strategy used when the engine is given no override.
    pub selection: SelectionMethod,

    /// Score recorded for an entity whose evaluation failed or timed out.
    ///
    /// Defaults to 0.0. For fitness functions that can return negative
    /// scores, set this below the valid range so that failed entities are
    /// never preferred.
    pub fallback_score: f64,

    /// Random seed for reproducibility.
    ///
    /// `None` uses a random seed.
    pub seed: Option<u64>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 100,
            generations: 100,
            mutation_rate: 0.1,
            crossover_rate: 0.8,
            elitism_rate: 0.1,
            max_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            evaluation_timeout: None,
            tournament_size: 3,
            selection_pressure: 1.0,
            termination: Vec::new(),
            selection: SelectionMethod::default(),
            fallback_score: 0.0,
            seed: None,
        }
    }
}

impl EvolutionConfig {
    /// Sets the population size.
    pub fn with_population_size(mut self, n: usize) -> Self {
        self.population_size = n;
        self
    }

    /// Sets the generation budget.
    pub fn with_generations(mut self, n: usize) -> Self {
        self.generations = n;
        self
    }

    /// Sets the mutation rate.
    pub fn with_mutation_rate(mut self, rate: f64) -> Self {
        self.mutation_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets the crossover rate.
    pub fn with_crossover_rate(mut self, rate: f64) -> Self {
        self.crossover_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets the elitism rate.
    pub fn with_elitism_rate(mut self, rate: f64) -> Self {
        self.elitism_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets the evaluation concurrency limit.
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    /// Sets the per-evaluation timeout.
    pub fn with_evaluation_timeout(mut self, timeout: Duration) -> Self {
        self.evaluation_timeout = Some(timeout);
        self
    }

    /// Removes the per-evaluation timeout.
    pub fn without_evaluation_timeout(mut self) -> Self {
        self.evaluation_timeout = None;
        self
    }

    /// Sets the tournament size.
    pub fn with_tournament_size(mut self, k: usize) -> Self {
        self.tournament_size = k;
        self
    }

    /// Sets the rank-selection pressure.
    pub fn with_selection_pressure(mut self, pressure: f64) -> Self {
        self.selection_pressure = pressure;
        self
    }

    /// Appends a termination criterion.
    pub fn with_termination(mut self, criterion: TerminationCriterion) -> Self {
        self.termination.push(criterion);
        self
    }

    /// Sets the default selection strategy.
    pub fn with_selection(mut self, selection: SelectionMethod) -> Self {
        self.selection = selection;
        self
    }

    /// Sets the score recorded for failed or timed-out evaluations.
    pub fn with_fallback_score(mut self, score: f64) -> Self {
        self.fallback_score = score;
        self
    }

    /// Sets the random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Preset for quick exploratory runs.
    ///
    /// - Population: 30, Generations: 50
    /// - Stops after 10 generations without improvement
    pub fn fast() -> Self {
        Self {
            population_size: 30,
            generations: 50,
            termination: vec![TerminationCriterion::NoImprovement(10)],
            ..Self::default()
        }
    }

    /// Preset balancing quality and run time.
    ///
    /// - Population: 100, Generations: 200
    /// - Stops after 25 generations without improvement
    pub fn balanced() -> Self {
        Self {
            population_size: 100,
            generations: 200,
            termination: vec![TerminationCriterion::NoImprovement(25)],
            ..Self::default()
        }
    }

    /// Preset for long, quality-oriented runs.
    ///
    /// - Population: 200, Generations: 1000, Elitism: 5%
    /// - Stops after 60 generations without improvement
    pub fn thorough() -> Self {
        Self {
            population_size: 200,
            generations: 1000,
            elitism_rate: 0.05,
            termination: vec![TerminationCriterion::NoImprovement(60)],
            ..Self::default()
        }
    }

    /// Number of elites carried into each new generation.
    ///
    /// Zero when `elitism_rate` is zero, otherwise
    /// `max(1, round(population_size * elitism_rate))`.
    pub fn elite_count(&self) -> usize {
        if self.elitism_rate == 0.0 {
            return 0;
        }
        let count = (self.population_size as f64 * self.elitism_rate).round() as usize;
        count.clamp(1, self.population_size.max(1))
    }

    /// Number of bred offspring per generation.
    pub fn offspring_count(&self) -> usize {
        self.population_size - self.elite_count()
    }

    /// Validates the configuration.
    ///
    /// Returns the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::PopulationSize);
        }
        if self.generations == 0 {
            return Err(ConfigError::Generations);
        }
        for (field, value) in [
            ("mutation_rate", self.mutation_rate),
            ("crossover_rate", self.crossover_rate),
            ("elitism_rate", self.elitism_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Rate { field, value });
            }
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::MaxConcurrency);
        }
        if self.evaluation_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::EvaluationTimeout);
        }
        if self.tournament_size == 0 {
            return Err(ConfigError::TournamentSize);
        }
        if !self.selection_pressure.is_finite() || self.selection_pressure < 0.0 {
            return Err(ConfigError::SelectionPressure(self.selection_pressure));
        }
        if !self.fallback_score.is_finite() {
            return Err(ConfigError::FallbackScore(self.fallback_score));
        }
        for (index, criterion) in self.termination.iter().enumerate() {
            criterion.validate(index)?;
        }
        Ok(())
    }

    /// Clamps the rate fields into [0, 1], then validates.
    ///
    /// NaN rates are not clamped and fail validation.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.mutation_rate = self.mutation_rate.clamp(0.0, 1.0);
        self.crossover_rate = self.crossover_rate.clamp(0.0, 1.0);
        self.elitism_rate = self.elitism_rate.clamp(0.0, 1.0);
        self.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_config() {
        let config = EvolutionConfig::default();
        assert_eq!(config.population_size, 100);
        assert_eq!(config.generations, 100);
        assert!((config.mutation_rate - 0.1).abs() < 1e-10);
        assert!((config.crossover_rate - 0.8).abs() < 1e-10);
        assert!((config.elitism_rate - 0.1).abs() < 1e-10);
        assert!(config.max_concurrency >= 1);
        assert!(config.evaluation_timeout.is_none());
        assert_eq!(config.tournament_size, 3);
        assert!(config.termination.is_empty());
        assert_eq!(config.selection, SelectionMethod::Tournament);
        assert_eq!(config.fallback_score, 0.0);
        assert!(config.seed.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = EvolutionConfig::default()
            .with_population_size(20)
            .with_generations(7)
            .with_mutation_rate(0.3)
            .with_crossover_rate(0.6)
            .with_elitism_rate(0.25)
            .with_max_concurrency(2)
            .with_evaluation_timeout(Duration::from_millis(250))
            .with_tournament_size(5)
            .with_selection_pressure(2.0)
            .with_selection(SelectionMethod::Rank)
            .with_fallback_score(-1.0)
            .with_termination(TerminationCriterion::TargetFitness(9.0))
            .with_seed(42);

        assert_eq!(config.population_size, 20);
        assert_eq!(config.generations, 7);
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.evaluation_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.tournament_size, 5);
        assert_eq!(config.selection, SelectionMethod::Rank);
        assert_eq!(config.fallback_score, -1.0);
        assert_eq!(config.termination, vec![TerminationCriterion::TargetFitness(9.0)]);
        assert_eq!(config.seed, Some(42));
        assert!(config.validate().is_ok());

        let config = config.without_evaluation_timeout();
        assert!(config.evaluation_timeout.is_none());
    }

    #[test]
    fn test_clamp_rates() {
        let config = EvolutionConfig::default()
            .with_elitism_rate(1.5)
            .with_crossover_rate(-0.5)
            .with_mutation_rate(2.0);

        assert_eq!(config.elitism_rate, 1.0);
        assert_eq!(config.crossover_rate, 0.0);
        assert_eq!(config.mutation_rate, 1.0);
    }

    #[test]
    fn test_validated_clamps_direct_fields() {
        let config = EvolutionConfig {
            mutation_rate: 3.0,
            elitism_rate: -1.0,
            ..EvolutionConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Rate {
                field: "mutation_rate",
                value: 3.0
            })
        );
        let config = config.validated().unwrap();
        assert_eq!(config.mutation_rate, 1.0);
        assert_eq!(config.elitism_rate, 0.0);
    }

    #[test]
    fn test_validated_rejects_nan_rate() {
        let config = EvolutionConfig {
            crossover_rate: f64::NAN,
            ..EvolutionConfig::default()
        };
        let err = config.validated().unwrap_err();
        assert_eq!(err.field(), "crossover_rate");
    }

    #[test]
    fn test_validate_fields() {
        let cases = [
            (EvolutionConfig::default().with_population_size(0), "population_size"),
            (EvolutionConfig::default().with_generations(0), "generations"),
            (EvolutionConfig::default().with_max_concurrency(0), "max_concurrency"),
            (
                EvolutionConfig::default().with_evaluation_timeout(Duration::ZERO),
                "evaluation_timeout",
            ),
            (EvolutionConfig::default().with_tournament_size(0), "tournament_size"),
            (
                EvolutionConfig::default().with_selection_pressure(-0.1),
                "selection_pressure",
            ),
            (
                EvolutionConfig::default().with_fallback_score(f64::NEG_INFINITY),
                "fallback_score",
            ),
        ];
        for (config, field) in cases {
            assert_eq!(config.validate().unwrap_err().field(), field);
        }
    }

    #[test]
    fn test_validate_termination() {
        let config = EvolutionConfig::default()
            .with_termination(TerminationCriterion::TargetFitness(1.0))
            .with_termination(TerminationCriterion::NoImprovement(1));
        match config.validate() {
            Err(ConfigError::Termination { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected termination error, got {other:?}"),
        }

        let config =
            EvolutionConfig::default().with_termination(TerminationCriterion::MaxGenerations(0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_population_of_one_is_valid() {
        let config = EvolutionConfig::default().with_population_size(1);
        assert!(config.validate().is_ok());
        assert_eq!(config.elite_count(), 1);
        assert_eq!(config.offspring_count(), 0);
    }

    // ---- Elite count ----

    #[test]
    fn test_elite_count_rounds() {
        let config = EvolutionConfig::default()
            .with_population_size(10)
            .with_elitism_rate(0.2);
        assert_eq!(config.elite_count(), 2);
        assert_eq!(config.offspring_count(), 8);
    }

    #[test]
    fn test_elite_count_zero_rate() {
        let config = EvolutionConfig::default().with_elitism_rate(0.0);
        assert_eq!(config.elite_count(), 0);
    }

    #[test]
    fn test_elite_count_at_least_one() {
        let config = EvolutionConfig::default()
            .with_population_size(10)
            .with_elitism_rate(0.01);
        assert_eq!(config.elite_count(), 1);
    }

    #[test]
    fn test_elite_count_full() {
        let config = EvolutionConfig::default()
            .with_population_size(8)
            .with_elitism_rate(1.0);
        assert_eq!(config.elite_count(), 8);
        assert_eq!(config.offspring_count(), 0);
    }

    // ---- Termination criteria ----

    #[test]
    fn test_max_generations_criterion() {
        let c = TerminationCriterion::MaxGenerations(3);
        assert!(!c.is_met(0, 0.0, &[]));
        assert!(!c.is_met(1, 0.0, &[]));
        assert!(c.is_met(2, 0.0, &[]));
    }

    #[test]
    fn test_target_fitness_criterion() {
        let c = TerminationCriterion::TargetFitness(4.0);
        assert!(!c.is_met(0, 3.9, &[]));
        assert!(c.is_met(0, 4.0, &[]));
    }

    #[test]
    fn test_no_improvement_flat_window() {
        let c = TerminationCriterion::NoImprovement(3);
        assert!(c.is_met(5, 0.2, &[0.2, 0.2, 0.2]));
    }

    #[test]
    fn test_no_improvement_short_history() {
        let c = TerminationCriterion::NoImprovement(3);
        assert!(!c.is_met(2, 0.9, &[0.1, 0.9]));
    }

    #[test]
    fn test_no_improvement_uses_most_recent_window() {
        let c = TerminationCriterion::NoImprovement(2);
        assert!(c.is_met(9, 0.5, &[0.5, 0.5, 0.1, 0.0]));
        assert!(!c.is_met(9, 0.6, &[0.6, 0.5, 0.5, 0.5]));
    }

    // ---- Presets ----

    #[test]
    fn test_presets_are_valid() {
        for config in [
            EvolutionConfig::fast(),
            EvolutionConfig::balanced(),
            EvolutionConfig::thorough(),
        ] {
            assert!(config.validate().is_ok());
            assert_eq!(config.termination.len(), 1);
        }
        assert_eq!(EvolutionConfig::fast().population_size, 30);
        assert_eq!(EvolutionConfig::thorough().generations, 1000);
    }

    #[test]
    fn test_preset_chainable() {
        let config = EvolutionConfig::fast().with_population_size(12).with_seed(3);
        assert_eq!(config.population_size, 12);
        assert_eq!(config.generations, 50);
        assert_eq!(config.seed, Some(3));
    }

    proptest! {
        #[test]
        fn prop_elite_count_bounds(size in 1usize..500, rate in 0.0f64..=1.0) {
            let config = EvolutionConfig::default()
                .with_population_size(size)
                .with_elitism_rate(rate);
            let elites = config.elite_count();
            if rate == 0.0 {
                prop_assert_eq!(elites, 0);
            } else {
                prop_assert!(elites >= 1 && elites <= size);
            }
            prop_assert_eq!(elites + config.offspring_count(), size);
        }
    }
}
