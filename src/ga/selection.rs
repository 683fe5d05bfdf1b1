//! Built-in selection strategies.
//!
//! Selection determines which entities become parents. All strategies here
//! **maximize** (higher score = better) and draw with replacement, so the
//! same entity may be returned several times.
//!
//! # References
//!
//! - Blickle & Thiele (1996), "A Comparison of Selection Schemes used in
//!   Evolutionary Algorithms"
//! - Goldberg & Deb (1991), "A Comparative Analysis of Selection Schemes
//!   Used in Genetic Algorithms"

use super::types::{ScoreMap, Selection, SelectionOptions};
use rand::{Rng, RngCore};
use std::hash::Hash;

/// Selection strategy for choosing parents.
///
/// # Examples
///
/// ```
/// use u_evolve::ga::{EvolutionConfig, SelectionMethod};
///
/// let config = EvolutionConfig::default()
///     .with_selection(SelectionMethod::Tournament)
///     .with_tournament_size(4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SelectionMethod {
    /// Tournament selection: pick `tournament_size` entities at random,
    /// keep the best.
    ///
    /// Higher `tournament_size` = stronger selection pressure.
    ///
    /// # Complexity
    /// O(k) per selection
    #[default]
    Tournament,

    /// Fitness-proportionate (roulette wheel) selection.
    ///
    /// Weights are scores shifted so the worst entity still has a small
    /// positive weight, which keeps negative scores usable.
    ///
    /// # Complexity
    /// O(n) per selection (linear scan)
    Roulette,

    /// Rank-based selection.
    ///
    /// Entities are sorted by score and weighted by
    /// `(n - rank)^selection_pressure`: pressure 0 is uniform, 1 is linear
    /// ranking (Baker, 1985), larger values favour the top more strongly.
    ///
    /// # Complexity
    /// O(n log n) per call (sort), O(n) per selection
    Rank,
}

impl<E> Selection<E> for SelectionMethod
where
    E: Clone + Eq + Hash + Send + Sync,
{
    fn name(&self) -> &str {
        match self {
            SelectionMethod::Tournament => "tournament",
            SelectionMethod::Roulette => "roulette",
            SelectionMethod::Rank => "rank",
        }
    }

    fn select(
        &self,
        population: &[E],
        scores: &ScoreMap<E>,
        count: usize,
        options: &SelectionOptions,
        rng: &mut dyn RngCore,
    ) -> Vec<E> {
        if population.is_empty() || count == 0 {
            return Vec::new();
        }

        // Unscored entities rank below everything that was scored.
        let fitness: Vec<f64> = population
            .iter()
            .map(|e| scores.get(e).copied().unwrap_or(f64::NEG_INFINITY))
            .collect();

        let indices: Vec<usize> = match self {
            SelectionMethod::Tournament => (0..count)
                .map(|_| tournament(&fitness, options.tournament_size, rng))
                .collect(),
            SelectionMethod::Roulette => {
                let weights = roulette_weights(&fitness);
                (0..count).map(|_| spin(&weights, rng)).collect()
            }
            SelectionMethod::Rank => {
                let weights = rank_weights(&fitness, options.selection_pressure);
                (0..count).map(|_| spin(&weights, rng)).collect()
            }
        };

        indices.into_iter().map(|i| population[i].clone()).collect()
    }
}

/// Tournament selection: pick k random entities, return the best.
fn tournament(fitness: &[f64], k: usize, rng: &mut dyn RngCore) -> usize {
    let k = k.max(1);
    let n = fitness.len();

    let mut best_idx = rng.random_range(0..n);
    for _ in 1..k {
        let idx = rng.random_range(0..n);
        if fitness[idx] > fitness[best_idx] {
            best_idx = idx;
        }
    }
    best_idx
}

/// Roulette weights for maximization: `w_i = f_i - min_f + epsilon`.
fn roulette_weights(fitness: &[f64]) -> Vec<f64> {
    let epsilon = 1e-10;
    let finite = fitness.iter().copied().filter(|f| f.is_finite());
    let min_fitness = finite.fold(f64::INFINITY, f64::min);
    if !min_fitness.is_finite() {
        return vec![1.0; fitness.len()];
    }

    fitness
        .iter()
        .map(|&f| {
            if f.is_finite() {
                f - min_fitness + epsilon
            } else {
                epsilon
            }
        })
        .collect()
}

/// Rank weights: best entity gets `n^pressure`, worst gets `1`.
fn rank_weights(fitness: &[f64], pressure: f64) -> Vec<f64> {
    let n = fitness.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        fitness[b]
            .partial_cmp(&fitness[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut weights = vec![0.0; n];
    for (rank, &idx) in order.iter().enumerate() {
        weights[idx] = ((n - rank) as f64).powf(pressure);
    }
    weights
}

/// Draw an index with probability proportional to its weight.
fn spin(weights: &[f64], rng: &mut dyn RngCore) -> usize {
    let n = weights.len();
    if n == 1 {
        return 0;
    }

    let total: f64 = weights.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return rng.random_range(0..n);
    }

    let threshold = rng.random_range(0.0..total);
    let mut cumulative = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        cumulative += w;
        if cumulative > threshold {
            return i;
        }
    }

    n - 1 // floating-point fallback
}
