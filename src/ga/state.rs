//! Immutable per-generation snapshots.

use super::types::{Entity, Metadata, ScoreMap};
use std::collections::{HashMap, HashSet, VecDeque};

/// Maximum number of past best scores kept in [`GenerationState::fitness_history`].
pub const FITNESS_HISTORY_LIMIT: usize = 100;

/// Snapshot of one generation.
///
/// Produced by the engine after the population has been evaluated. Every
/// entity in `population` has an entry in `scores`; entities whose
/// evaluation failed carry the configured fallback score.
#[derive(Debug, Clone)]
pub struct GenerationState<E: Entity> {
    population: Vec<E>,
    scores: ScoreMap<E>,
    metadata: HashMap<E, Metadata>,
    generation: usize,
    best: Option<(E, f64)>,
    average_score: f64,
    diversity: f64,
    fitness_history: VecDeque<f64>,
}

impl<E: Entity> GenerationState<E> {
    /// Builds a snapshot and derives the best and average scores.
    ///
    /// # Panics
    /// Panics if `scores` is non-empty but misses a member of
    /// `population`, or holds an entity that is not in it. Both mean the
    /// engine lost track of an evaluation.
    pub(crate) fn new(
        population: Vec<E>,
        scores: ScoreMap<E>,
        metadata: HashMap<E, Metadata>,
        generation: usize,
        fitness_history: VecDeque<f64>,
        diversity: f64,
    ) -> Self {
        if !scores.is_empty() {
            for entity in &population {
                assert!(
                    scores.contains_key(entity),
                    "generation {generation}: score map is missing {entity:?}"
                );
            }
            let members: HashSet<&E> = population.iter().collect();
            for entity in scores.keys() {
                assert!(
                    members.contains(entity),
                    "generation {generation}: score map references {entity:?} outside the population"
                );
            }
        }

        // First maximum in population order wins ties.
        let mut best: Option<(E, f64)> = None;
        for entity in &population {
            if let Some(&score) = scores.get(entity) {
                if best.as_ref().map_or(true, |(_, b)| score > *b) {
                    best = Some((entity.clone(), score));
                }
            }
        }

        let average_score = if scores.is_empty() {
            0.0
        } else {
            scores.values().sum::<f64>() / scores.len() as f64
        };

        Self {
            population,
            scores,
            metadata,
            generation,
            best,
            average_score,
            diversity,
            fitness_history,
        }
    }

    /// The entities of this generation, in breeding order.
    pub fn population(&self) -> &[E] {
        &self.population
    }

    /// Score of every evaluated entity.
    pub fn scores(&self) -> &ScoreMap<E> {
        &self.scores
    }

    /// Score of one entity, if it was evaluated.
    pub fn score_of(&self, entity: &E) -> Option<f64> {
        self.scores.get(entity).copied()
    }

    /// Metadata returned by the fitness function, for entities that had any.
    pub fn metadata(&self) -> &HashMap<E, Metadata> {
        &self.metadata
    }

    /// Generation counter, starting at 0.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Highest-scoring entity, or `None` when nothing was scored.
    pub fn best_entity(&self) -> Option<&E> {
        self.best.as_ref().map(|(e, _)| e)
    }

    /// Highest score, or 0.0 when nothing was scored.
    pub fn best_score(&self) -> f64 {
        self.best.as_ref().map_or(0.0, |(_, s)| *s)
    }

    /// Mean of all scores, or 0.0 when nothing was scored.
    pub fn average_score(&self) -> f64 {
        self.average_score
    }

    /// Average pairwise dissimilarity of the population, in [0, 1].
    pub fn diversity(&self) -> f64 {
        self.diversity
    }

    /// Best scores of previous generations, most recent first.
    ///
    /// Capped at [`FITNESS_HISTORY_LIMIT`] entries.
    pub fn fitness_history(&self) -> &VecDeque<f64> {
        &self.fitness_history
    }

    /// History for the next generation: this generation's best score
    /// pushed to the front, oldest entries dropped beyond the cap.
    pub(crate) fn next_history(&self) -> VecDeque<f64> {
        let mut history = VecDeque::with_capacity(FITNESS_HISTORY_LIMIT);
        history.push_back(self.best_score());
        history.extend(
            self.fitness_history
                .iter()
                .copied()
                .take(FITNESS_HISTORY_LIMIT - 1),
        );
        history
    }

    /// Population members ranked by descending score.
    ///
    /// Distinct entities come first; duplicates of already ranked entities
    /// follow, again by score. The sort is stable, so ties keep population
    /// order.
    pub fn ranked(&self) -> Vec<&E> {
        let mut order: Vec<&E> = self.population.iter().collect();
        order.sort_by(|a, b| {
            let sa = self.scores.get(*a).copied().unwrap_or(f64::NEG_INFINITY);
            let sb = self.scores.get(*b).copied().unwrap_or(f64::NEG_INFINITY);
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut seen = HashSet::with_capacity(order.len());
        let (mut distinct, duplicates): (Vec<&E>, Vec<&E>) =
            order.into_iter().partition(|e| seen.insert(*e));
        distinct.extend(duplicates);
        distinct
    }
}
