//! Offspring production and elitism.
//!
//! [`Breeder`] turns a scored generation into offspring: selection picks
//! twice as many parents as offspring are needed, consecutive parents are
//! paired, each pair is crossed over with probability `crossover_rate`, and
//! every child goes through the mutation strategy. [`select_elites`] and
//! [`merge_elites`] carry the best entities of the previous generation
//! forward unchanged.

use super::config::EvolutionConfig;
use super::evaluator::panic_message;
use super::observer::{EngineEvent, EngineWarning, Observer, WarningKind};
use super::state::GenerationState;
use super::types::{Crossover, Entity, Mutation, MutationOptions, Selection, SelectionOptions};
use rand::{Rng, RngCore};
use std::panic::{self, AssertUnwindSafe};

/// Produces offspring from a scored generation.
///
/// Holds borrowed strategies for the duration of one breeding step.
pub struct Breeder<'a, E> {
    pub selection: &'a dyn Selection<E>,
    pub crossover: &'a dyn Crossover<E>,
    pub mutation: &'a dyn Mutation<E>,
    pub config: &'a EvolutionConfig,
    pub observer: &'a dyn Observer,
}

impl<E: Entity> Breeder<'_, E> {
    /// Breeds exactly `count` offspring for `generation` from `parent`.
    ///
    /// Operator failures, panics included, are recovered locally: a failed
    /// crossover passes both parents through, a failed mutation keeps the
    /// unmutated child.
    ///
    /// # Panics
    /// Panics if the selection strategy returns too few parents to produce
    /// `count` offspring.
    pub fn breed(
        &self,
        parent: &GenerationState<E>,
        count: usize,
        generation: usize,
        rng: &mut dyn RngCore,
    ) -> Vec<E> {
        if count == 0 {
            return Vec::new();
        }

        let selection_options = SelectionOptions {
            tournament_size: self.config.tournament_size,
            selection_pressure: self.config.selection_pressure,
        };
        let parents = self.selection.select(
            parent.population(),
            parent.scores(),
            count * 2,
            &selection_options,
            rng,
        );

        let strength = self.mutation.strength(generation);
        let mutation_options = MutationOptions {
            rate: self.config.mutation_rate,
            strength: if strength.is_nan() {
                1.0
            } else {
                strength.clamp(0.0, 1.0)
            },
            best_fitness: parent.best_score(),
            generation,
        };

        let mut offspring = Vec::with_capacity(parents.len());
        let mut pairs = parents.chunks_exact(2);
        for pair in &mut pairs {
            let (a, b) = if rng.random_range(0.0..1.0) < self.config.crossover_rate {
                self.cross(&pair[0], &pair[1], generation, rng)
            } else {
                (pair[0].clone(), pair[1].clone())
            };
            offspring.push(self.mutate(a, &mutation_options, rng));
            offspring.push(self.mutate(b, &mutation_options, rng));
        }
        if let [single] = pairs.remainder() {
            offspring.push(self.mutate(single.clone(), &mutation_options, rng));
        }

        assert!(
            offspring.len() >= count,
            "selection strategy `{}` returned {} parents; {} offspring are required",
            self.selection.name(),
            parents.len(),
            count
        );
        offspring.truncate(count);
        offspring
    }

    fn cross(&self, a: &E, b: &E, generation: usize, rng: &mut dyn RngCore) -> (E, E) {
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| self.crossover.crossover(a, b, rng)));
        let message = match attempt {
            Ok(Ok(children)) => return children,
            Ok(Err(err)) => err.to_string(),
            Err(payload) => format!("crossover panicked: {}", panic_message(&*payload)),
        };
        self.warn(
            generation,
            WarningKind::CrossoverFailed,
            self.crossover.name(),
            format!("{a:?} x {b:?}"),
            message,
        );
        (a.clone(), b.clone())
    }

    fn mutate(&self, entity: E, options: &MutationOptions, rng: &mut dyn RngCore) -> E {
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| self.mutation.mutate(&entity, options, rng)));
        let message = match attempt {
            Ok(Ok(mutated)) => return mutated,
            Ok(Err(err)) => err.to_string(),
            Err(payload) => format!("mutation panicked: {}", panic_message(&*payload)),
        };
        self.warn(
            options.generation,
            WarningKind::MutationFailed,
            self.mutation.name(),
            format!("{entity:?}"),
            message,
        );
        entity
    }

    fn warn(&self, generation: usize, kind: WarningKind, strategy: &str, entity: String, message: String) {
        self.observer.on_event(&EngineEvent::Warning(EngineWarning {
            generation,
            kind,
            strategy: strategy.to_string(),
            entity,
            message,
        }));
    }
}

/// Top entities of `previous` to carry forward unchanged.
///
/// Returns up to [`EvolutionConfig::elite_count`] entities by descending
/// score, preferring distinct entities. Empty when elitism is disabled or
/// the previous generation has no scores.
pub fn select_elites<E: Entity>(previous: &GenerationState<E>, config: &EvolutionConfig) -> Vec<E> {
    let elite_count = config.elite_count();
    if elite_count == 0 || previous.scores().is_empty() {
        return Vec::new();
    }
    previous
        .ranked()
        .into_iter()
        .take(elite_count)
        .cloned()
        .collect()
}

/// Prepends `elites` to `offspring` and truncates to `population_size`.
///
/// Elites take priority; offspring at the tail are dropped first.
pub fn merge_elites<E>(elites: Vec<E>, offspring: Vec<E>, population_size: usize) -> Vec<E> {
    let mut next = elites;
    next.extend(offspring);
    next.truncate(population_size);
    next
}
