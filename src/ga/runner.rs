//! Generation loop execution.
//!
//! [`GenerationEngine`] owns the configuration and strategies of a run;
//! [`GenerationEngine::run`] turns an initial population into a lazy
//! [`Generations`] iterator:
//! evaluate → yield → check termination → select → crossover → mutate →
//! elitism → evaluate → yield → ...
//!
//! Nothing is computed until the iterator is polled, and nothing past the
//! last polled generation is ever computed. Dropping the iterator cancels
//! the run.

use super::breeder::{merge_elites, select_elites, Breeder};
use super::config::EvolutionConfig;
use super::diversity::estimate_diversity;
use super::error::EngineError;
use super::evaluator::Evaluator;
use super::observer::{EngineEvent, LogObserver, Observer, StopReason};
use super::state::GenerationState;
use super::types::{
    Crossover, Dissimilarity, Entity, EqualitySimilarity, EvaluationContext, Fitness, Mutation,
    NoCrossover, NoMutation, Representation, Selection,
};
use crate::random::rng_from_seed;
use rand::rngs::StdRng;
use std::collections::{HashMap, VecDeque};
use std::iter::FusedIterator;
use std::sync::Arc;

/// A configured evolutionary search.
///
/// Build one with [`GenerationEngine::builder`]. The engine itself is
/// immutable and cheap to clone; every call to [`run`](Self::run) starts an
/// independent run.
///
/// # Usage
///
/// ```ignore
/// let config = EvolutionConfig::default()
///     .with_population_size(50)
///     .with_generations(100)
///     .with_seed(42);
/// let engine = GenerationEngine::builder(config, |bits: &Vec<bool>| {
///     bits.iter().filter(|&&b| b).count() as f64
/// })
/// .mutation(BitFlipMutation)
/// .crossover(UniformCrossover)
/// .build()?;
///
/// for state in engine.run(initial)? {
///     println!("{}: {}", state.generation(), state.best_score());
/// }
/// ```
#[derive(Clone)]
pub struct GenerationEngine<E: Entity> {
    config: EvolutionConfig,
    evaluator: Evaluator<E>,
    selection: Arc<dyn Selection<E>>,
    mutation: Arc<dyn Mutation<E>>,
    crossover: Arc<dyn Crossover<E>>,
    metric: Arc<dyn Dissimilarity<E>>,
    observer: Arc<dyn Observer>,
    context: Arc<HashMap<String, String>>,
}

/// Assembles a [`GenerationEngine`].
///
/// Only the configuration and fitness function are required. Unset
/// strategies default to:
///
/// - selection: [`EvolutionConfig::selection`]
/// - mutation: [`NoMutation`]
/// - crossover: [`NoCrossover`]
/// - representation: [`EqualitySimilarity`]
/// - observer: [`LogObserver`]
pub struct EngineBuilder<E: Entity> {
    config: EvolutionConfig,
    fitness: Arc<dyn Fitness<E>>,
    selection: Option<Arc<dyn Selection<E>>>,
    mutation: Option<Arc<dyn Mutation<E>>>,
    crossover: Option<Arc<dyn Crossover<E>>>,
    metric: Option<Arc<dyn Dissimilarity<E>>>,
    observer: Option<Arc<dyn Observer>>,
    context: HashMap<String, String>,
}

impl<E: Entity> EngineBuilder<E> {
    pub fn selection(mut self, selection: impl Selection<E> + 'static) -> Self {
        self.selection = Some(Arc::new(selection));
        self
    }

    pub fn mutation(mut self, mutation: impl Mutation<E> + 'static) -> Self {
        self.mutation = Some(Arc::new(mutation));
        self
    }

    pub fn crossover(mut self, crossover: impl Crossover<E> + 'static) -> Self {
        self.crossover = Some(Arc::new(crossover));
        self
    }

    /// Sets the representation used for diversity measurement.
    pub fn representation<R>(mut self, representation: R) -> Self
    where
        R: Representation<E> + 'static,
    {
        self.metric = Some(Arc::new(representation));
        self
    }

    pub fn observer(mut self, observer: impl Observer + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Replaces the key/value context passed to every fitness evaluation.
    pub fn context(mut self, values: HashMap<String, String>) -> Self {
        self.context = values;
        self
    }

    /// Adds one key/value pair to the evaluation context.
    pub fn context_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Validates the configuration and assembles the engine.
    ///
    /// Rates are clamped to [0, 1] first; any remaining problem is reported
    /// as [`EngineError::Config`] naming the offending field.
    pub fn build(self) -> Result<GenerationEngine<E>, EngineError> {
        let config = self.config.validated()?;
        let evaluator = Evaluator::new(self.fitness, &config)?;

        let selection: Arc<dyn Selection<E>> = match self.selection {
            Some(selection) => selection,
            None => Arc::new(config.selection),
        };
        let mutation: Arc<dyn Mutation<E>> = match self.mutation {
            Some(mutation) => mutation,
            None => Arc::new(NoMutation),
        };
        let crossover: Arc<dyn Crossover<E>> = match self.crossover {
            Some(crossover) => crossover,
            None => Arc::new(NoCrossover),
        };
        let metric: Arc<dyn Dissimilarity<E>> = match self.metric {
            Some(metric) => metric,
            None => Arc::new(EqualitySimilarity),
        };
        let observer: Arc<dyn Observer> = match self.observer {
            Some(observer) => observer,
            None => Arc::new(LogObserver),
        };

        log::debug!(
            "engine ready: population={} generations={} selection={} mutation={} crossover={}",
            config.population_size,
            config.generations,
            selection.name(),
            mutation.name(),
            crossover.name()
        );

        Ok(GenerationEngine {
            config,
            evaluator,
            selection,
            mutation,
            crossover,
            metric,
            observer,
            context: Arc::new(self.context),
        })
    }
}

impl<E: Entity> GenerationEngine<E> {
    /// Starts building an engine around a fitness function.
    pub fn builder(config: EvolutionConfig, fitness: impl Fitness<E> + 'static) -> EngineBuilder<E> {
        EngineBuilder {
            config,
            fitness: Arc::new(fitness),
            selection: None,
            mutation: None,
            crossover: None,
            metric: None,
            observer: None,
            context: HashMap::new(),
        }
    }

    /// The validated configuration.
    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// Starts a run from `initial`.
    ///
    /// Every generation, the initial one included, has exactly
    /// `population_size` entities.
    ///
    /// # Errors
    /// - [`EngineError::EmptyPopulation`] if `initial` is empty
    /// - [`EngineError::PopulationSize`] if `initial` does not hold
    ///   `population_size` entities
    pub fn run(&self, initial: Vec<E>) -> Result<Generations<E>, EngineError> {
        if initial.is_empty() {
            return Err(EngineError::EmptyPopulation);
        }
        if initial.len() != self.config.population_size {
            return Err(EngineError::PopulationSize {
                expected: self.config.population_size,
                actual: initial.len(),
            });
        }
        Ok(Generations {
            engine: self.clone(),
            rng: rng_from_seed(self.config.seed),
            phase: Phase::Pending(initial),
        })
    }

    /// Why the run should stop after `state`, if it should.
    ///
    /// The generation ceiling is checked first, then each termination
    /// criterion in configuration order.
    fn stop_reason(&self, state: &GenerationState<E>) -> Option<StopReason> {
        if state.generation() + 1 >= self.config.generations {
            return Some(StopReason::GenerationLimit);
        }
        let history: Vec<f64> = state.fitness_history().iter().copied().collect();
        self.config
            .termination
            .iter()
            .find(|c| c.is_met(state.generation(), state.best_score(), &history))
            .map(|c| StopReason::Criterion(*c))
    }

    /// Breeds the successor population of `previous`.
    fn breed(&self, previous: &GenerationState<E>, generation: usize, rng: &mut StdRng) -> Vec<E> {
        let breeder = Breeder {
            selection: self.selection.as_ref(),
            crossover: self.crossover.as_ref(),
            mutation: self.mutation.as_ref(),
            config: &self.config,
            observer: self.observer.as_ref(),
        };
        let elites = select_elites(previous, &self.config);
        let offspring = breeder.breed(
            previous,
            self.config.population_size - elites.len(),
            generation,
            rng,
        );
        merge_elites(elites, offspring, self.config.population_size)
    }

    /// Evaluates `population` and wraps it into a snapshot.
    fn settle(
        &self,
        population: Vec<E>,
        generation: usize,
        fitness_history: VecDeque<f64>,
        rng: &mut StdRng,
    ) -> GenerationState<E> {
        let context = EvaluationContext::new(generation, Arc::clone(&self.context));
        let evaluation = self
            .evaluator
            .evaluate(&population, &context, self.observer.as_ref());
        let diversity = estimate_diversity(&population, self.metric.as_ref(), rng);

        let state = GenerationState::new(
            population,
            evaluation.scores,
            evaluation.metadata,
            generation,
            fitness_history,
            diversity,
        );

        self.observer.on_event(&EngineEvent::GenerationCompleted {
            generation,
            population_size: state.population().len(),
            best_score: state.best_score(),
            average_score: state.average_score(),
            diversity: state.diversity(),
        });
        state
    }
}

/// Runs an engine with default strategies for `E`.
///
/// Shorthand for `GenerationEngine::builder(config, fitness).build()?.run(initial)`.
pub fn evolve<E: Entity>(
    initial: Vec<E>,
    config: EvolutionConfig,
    fitness: impl Fitness<E> + 'static,
) -> Result<Generations<E>, EngineError> {
    GenerationEngine::builder(config, fitness).build()?.run(initial)
}

enum Phase<E: Entity> {
    Pending(Vec<E>),
    Running(Arc<GenerationState<E>>),
    Finished,
}

/// Lazy sequence of generation snapshots.
///
/// Each item is an `Arc` shared with the iterator, which keeps the latest
/// snapshot to breed from. The first item is the evaluated initial
/// population (generation 0). The sequence ends when the generation ceiling is reached or a termination
/// criterion holds; at most `generations` items are produced.
pub struct Generations<E: Entity> {
    engine: GenerationEngine<E>,
    rng: StdRng,
    phase: Phase<E>,
}

impl<E: Entity> Generations<E> {
    /// The engine driving this run.
    pub fn engine(&self) -> &GenerationEngine<E> {
        &self.engine
    }

    /// The most recently yielded generation, if any.
    pub fn current(&self) -> Option<&GenerationState<E>> {
        match &self.phase {
            Phase::Running(state) => Some(state.as_ref()),
            _ => None,
        }
    }

    fn advance(&mut self, previous: &GenerationState<E>) -> GenerationState<E> {
        let generation = previous.generation() + 1;
        self.engine.observer.on_event(&EngineEvent::GenerationStarted {
            generation,
            population_size: self.engine.config.population_size,
            best_score: Some(previous.best_score()),
        });

        let population = self.engine.breed(previous, generation, &mut self.rng);
        self.engine
            .settle(population, generation, previous.next_history(), &mut self.rng)
    }
}

impl<E: Entity> Iterator for Generations<E> {
    type Item = Arc<GenerationState<E>>;

    fn next(&mut self) -> Option<Arc<GenerationState<E>>> {
        let state = match std::mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Pending(initial) => {
                self.engine.observer.on_event(&EngineEvent::GenerationStarted {
                    generation: 0,
                    population_size: initial.len(),
                    best_score: None,
                });
                self.engine.settle(initial, 0, VecDeque::new(), &mut self.rng)
            }
            Phase::Running(current) => {
                if let Some(reason) = self.engine.stop_reason(&current) {
                    self.engine.observer.on_event(&EngineEvent::Terminated {
                        generation: current.generation(),
                        best_score: current.best_score(),
                        reason,
                    });
                    return None;
                }
                self.advance(&current)
            }
            Phase::Finished => return None,
        };

        let state = Arc::new(state);
        self.phase = Phase::Running(Arc::clone(&state));
        Some(state)
    }
}

impl<E: Entity> FusedIterator for Generations<E> {}

// ============================================================================
// Tests
// ============================================================================
