//! Strategy contracts between the generation engine and caller code.
//!
//! The engine never looks inside an entity. Everything it knows about one
//! comes through these traits:
//!
//! - [`Fitness`]: scores an entity (the only required strategy)
//! - [`Selection`]: picks parents from a scored population
//! - [`Crossover`]: recombines two parents into two children
//! - [`Mutation`]: perturbs one entity
//! - [`Representation`]: normalized form plus a dissimilarity metric,
//!   used only for diversity measurement
//!
//! Strategies are held as trait objects for the duration of a run, so every
//! method takes the random number generator as `&mut dyn RngCore`. The
//! [`rand::Rng`] extension methods work on it directly.

use super::error::StrategyError;
use rand::RngCore;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A candidate solution.
///
/// Entities are used directly as score-map keys, so they need value
/// equality and hashing. Types without a natural `Hash` (for example
/// `Vec<f64>`) should be wrapped in a newtype that hashes a stable
/// fingerprint such as the bit patterns of its genes.
///
/// Implemented automatically for every qualifying type.
pub trait Entity: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> Entity for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// Scores keyed by entity.
pub type ScoreMap<E> = HashMap<E, f64>;

/// Free-form data a fitness function may attach to a score.
pub type Metadata = BTreeMap<String, String>;

/// Result of one fitness evaluation.
///
/// Higher scores are better. A bare number converts via `From<f64>`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scored {
    pub score: f64,
    pub metadata: Metadata,
}

impl Scored {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            metadata: Metadata::new(),
        }
    }

    /// Attaches one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// A score is usable only if it is a finite number.
    pub fn is_well_formed(&self) -> bool {
        self.score.is_finite()
    }
}

impl From<f64> for Scored {
    fn from(score: f64) -> Self {
        Self::new(score)
    }
}

/// Read-only context handed to every fitness evaluation.
///
/// Carries the caller's key/value map, the generation being evaluated, and
/// a cancellation flag. The flag is raised when the evaluation exceeds the
/// configured timeout; long-running fitness functions may poll
/// [`is_cancelled`](Self::is_cancelled) and return early. The engine has
/// already recorded the fallback score by then, so whatever they return is
/// discarded.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    generation: usize,
    values: Arc<HashMap<String, String>>,
    cancelled: Arc<AtomicBool>,
}

impl EvaluationContext {
    pub fn new(generation: usize, values: Arc<HashMap<String, String>>) -> Self {
        Self {
            generation,
            values,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Looks up a caller-supplied value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }

    /// Whether this evaluation has been abandoned because it timed out.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Same values and generation, with a fresh cancellation flag.
    pub(crate) fn for_task(&self) -> Self {
        Self::new(self.generation, Arc::clone(&self.values))
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

/// Scores an entity. Higher is better.
///
/// Any `Fn(&E) -> f64 + Send + Sync` closure is a fitness function.
///
/// # Thread Safety
///
/// Evaluations run concurrently on worker threads, so implementations must
/// be `Send + Sync`. Any I/O they perform is responsible for its own
/// timeouts; the engine only stops waiting.
pub trait Fitness<E>: Send + Sync {
    /// Returns a human-readable name for this strategy.
    fn name(&self) -> &str {
        "fitness"
    }

    /// Evaluates one entity.
    fn evaluate(&self, entity: &E, context: &EvaluationContext) -> Result<Scored, StrategyError>;

    /// Evaluates several entities.
    ///
    /// The default evaluates each entity independently and fails the whole
    /// batch on the first error or non-finite score.
    fn batch_evaluate(
        &self,
        entities: &[E],
        context: &EvaluationContext,
    ) -> Result<Vec<(E, Scored)>, StrategyError>
    where
        E: Clone,
    {
        entities
            .iter()
            .map(|entity| {
                let scored = self.evaluate(entity, context)?;
                if !scored.is_well_formed() {
                    return Err(StrategyError::new(format!(
                        "malformed score {} from {}",
                        scored.score,
                        self.name()
                    )));
                }
                Ok((entity.clone(), scored))
            })
            .collect()
    }
}

impl<E, F> Fitness<E> for F
where
    F: Fn(&E) -> f64 + Send + Sync,
{
    fn evaluate(&self, entity: &E, _context: &EvaluationContext) -> Result<Scored, StrategyError> {
        Ok(Scored::new(self(entity)))
    }
}

/// Parameters passed to every mutation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MutationOptions {
    /// Configured mutation rate in [0, 1].
    pub rate: f64,
    /// Value of [`Mutation::strength`] for the current generation.
    pub strength: f64,
    /// Best score of the parent generation.
    pub best_fitness: f64,
    /// Generation being bred.
    pub generation: usize,
}

/// Perturbs an entity.
///
/// The engine calls [`mutate`](Self::mutate) on every child. Whether the
/// entity actually changes is decided by the implementation from
/// `options.rate`; the engine does no rate gating of its own here.
pub trait Mutation<E>: Send + Sync {
    /// Returns a human-readable name for this strategy.
    fn name(&self) -> &str {
        "mutation"
    }

    /// Returns a (possibly) mutated copy of `entity`.
    fn mutate(
        &self,
        entity: &E,
        options: &MutationOptions,
        rng: &mut dyn RngCore,
    ) -> Result<E, StrategyError>;

    /// Mutation strength in [0, 1] for a generation. Defaults to 1.0.
    fn strength(&self, _generation: usize) -> f64 {
        1.0
    }
}

/// Parameters passed to every selection call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionOptions {
    pub tournament_size: usize,
    pub selection_pressure: f64,
}

/// Chooses parents from a scored population.
///
/// Must return exactly `count` entities. Drawing the same entity more than
/// once is allowed and expected.
pub trait Selection<E>: Send + Sync {
    /// Returns a human-readable name for this strategy.
    fn name(&self) -> &str {
        "selection"
    }

    fn select(
        &self,
        population: &[E],
        scores: &ScoreMap<E>,
        count: usize,
        options: &SelectionOptions,
        rng: &mut dyn RngCore,
    ) -> Vec<E>;
}

/// Combines two parents into two children.
///
/// Operands that are structurally invalid for the operator should be
/// returned unchanged rather than reported as an error.
pub trait Crossover<E>: Send + Sync {
    /// Returns a human-readable name for this strategy.
    fn name(&self) -> &str {
        "crossover"
    }

    fn crossover(&self, a: &E, b: &E, rng: &mut dyn RngCore) -> Result<(E, E), StrategyError>;
}

/// Maps entities to and from a normalized genome and measures how far apart
/// two entities are.
pub trait Representation<E>: Send + Sync {
    type Genome;

    fn encode(&self, entity: &E) -> Self::Genome;

    /// Returns `None` if the genome does not describe a valid entity.
    fn decode(&self, genome: &Self::Genome) -> Option<E>;

    /// Dissimilarity in [0, 1]: 0 for identical, 1 for maximally different.
    fn similarity(&self, a: &E, b: &E) -> f64;
}

/// Object-safe view of [`Representation::similarity`].
///
/// This is all the diversity estimator needs; every representation
/// provides it.
pub trait Dissimilarity<E>: Send + Sync {
    fn dissimilarity(&self, a: &E, b: &E) -> f64;
}

impl<E, R> Dissimilarity<E> for R
where
    R: Representation<E>,
{
    fn dissimilarity(&self, a: &E, b: &E) -> f64 {
        Representation::similarity(self, a, b)
    }
}

/// Identity mutation. Used when no mutation strategy is supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMutation;

impl<E: Clone> Mutation<E> for NoMutation {
    fn name(&self) -> &str {
        "none"
    }

    fn mutate(
        &self,
        entity: &E,
        _options: &MutationOptions,
        _rng: &mut dyn RngCore,
    ) -> Result<E, StrategyError> {
        Ok(entity.clone())
    }
}

/// Pass-through crossover. Used when no crossover strategy is supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCrossover;

impl<E: Clone> Crossover<E> for NoCrossover {
    fn name(&self) -> &str {
        "none"
    }

    fn crossover(&self, a: &E, b: &E, _rng: &mut dyn RngCore) -> Result<(E, E), StrategyError> {
        Ok((a.clone(), b.clone()))
    }
}

/// Equality-based representation: 0.0 for equal entities, 1.0 otherwise.
///
/// The default when no representation is supplied. A population of
/// identical entities has diversity 0.0 under it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualitySimilarity;

impl<E: Clone + PartialEq> Representation<E> for EqualitySimilarity {
    type Genome = E;

    fn encode(&self, entity: &E) -> E {
        entity.clone()
    }

    fn decode(&self, genome: &E) -> Option<E> {
        Some(genome.clone())
    }

    fn similarity(&self, a: &E, b: &E) -> f64 {
        if a == b {
            0.0
        } else {
            1.0
        }
    }
}
