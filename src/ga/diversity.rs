//! Population diversity estimation.
//!
//! Diversity is the mean dissimilarity over ordered pairs of distinct
//! population members. Small populations are measured exactly; larger ones
//! are estimated from a bounded random sample of pairs.

use super::types::Dissimilarity;
use rand::{Rng, RngCore};

/// Populations smaller than this are measured over every ordered pair.
pub const EXACT_DIVERSITY_LIMIT: usize = 10;

/// Upper bound on sampled pairs for large populations.
pub const MAX_DIVERSITY_SAMPLES: usize = 1000;

/// Estimates population diversity in [0, 1].
///
/// - fewer than 2 entities: 0.0
/// - fewer than [`EXACT_DIVERSITY_LIMIT`]: exact mean over all ordered
///   pairs `(i, j)` with `i != j`
/// - otherwise: mean over `min(MAX_DIVERSITY_SAMPLES, n² / 10)` random
///   ordered pairs of distinct positions
///
/// Individual dissimilarities are clamped to [0, 1]; NaN counts as 0.
///
/// # Complexity
/// O(n²) below the exact limit, O(min(1000, n²/10)) above it
pub fn estimate_diversity<E>(
    population: &[E],
    metric: &dyn Dissimilarity<E>,
    rng: &mut dyn RngCore,
) -> f64 {
    let n = population.len();
    if n < 2 {
        return 0.0;
    }

    let mean = if n < EXACT_DIVERSITY_LIMIT {
        let mut total = 0.0;
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    total += bounded(metric.dissimilarity(&population[i], &population[j]));
                }
            }
        }
        total / (n * (n - 1)) as f64
    } else {
        let samples = MAX_DIVERSITY_SAMPLES.min(n * n / 10);
        let mut total = 0.0;
        for _ in 0..samples {
            let (i, j) = distinct_pair(n, rng);
            total += bounded(metric.dissimilarity(&population[i], &population[j]));
        }
        total / samples as f64
    };

    mean.clamp(0.0, 1.0)
}

fn bounded(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Two different positions in `0..n`. The second draw skips over the first.
fn distinct_pair(n: usize, rng: &mut dyn RngCore) -> (usize, usize) {
    let i = rng.random_range(0..n);
    let mut j = rng.random_range(0..n - 1);
    if j >= i {
        j += 1;
    }
    (i, j)
}
