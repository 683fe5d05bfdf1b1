//! Ready-made operators for common entity encodings.
//!
//! The engine is encoding-agnostic; these cover the usual cases so callers
//! only have to write a fitness function.
//!
//! # Permutations (`Vec<usize>`)
//!
//! - [`order_crossover`] (OX): Davis (1985), preserves relative order
//! - [`pmx_crossover`] (PMX): Goldberg & Lingle (1985), preserves absolute position
//! - [`swap_mutation`], [`insert_mutation`], [`invert_mutation`]
//! - strategy wrappers: [`PermutationCrossover`], [`PermutationMutation`]
//!
//! # Other encodings
//!
//! - [`BitFlipMutation`] for `Vec<bool>`
//! - [`CharMutation`] for `String`
//! - [`UniformCrossover`] for any `Vec<T>`
//! - [`HammingRepresentation`] and [`EditDistanceRepresentation`] for
//!   diversity measurement
//!
//! Operands that are not valid for an operator (parents of different
//! lengths, vectors that are not permutations) come back unchanged.
//!
//! # References
//!
//! - Davis (1985), "Applying Adaptive Algorithms to Epistatic Domains"
//! - Goldberg & Lingle (1985), "Alleles, Loci, and the Traveling Salesman Problem"
//! - Cicirello (2023), "Genetic Operators for Permutation Representation"

use super::error::StrategyError;
use super::types::{Crossover, Mutation, MutationOptions, Representation};
use rand::{Rng, RngCore};

// ============================================================================
// Permutation crossover
// ============================================================================

/// Order Crossover (OX) for permutations.
///
/// Preserves the **relative order** of elements from both parents.
///
/// # Algorithm (Davis, 1985)
///
/// 1. Select a random segment `[start, end]` from parent1
/// 2. Copy segment to child at the same positions
/// 3. Fill remaining positions with elements from parent2, in their original
///    order, skipping elements already present in the child
///
/// Parents that are not permutations of the same `0..n` are returned as-is.
///
/// # Complexity
/// O(n) time, O(n) space
pub fn order_crossover(
    parent1: &[usize],
    parent2: &[usize],
    rng: &mut dyn RngCore,
) -> (Vec<usize>, Vec<usize>) {
    let n = parent1.len();
    if n < 2 || !compatible_permutations(parent1, parent2) {
        return (parent1.to_vec(), parent2.to_vec());
    }

    let (start, end) = random_segment(n, rng);

    let child1 = ox_build_child(parent1, parent2, start, end);
    let child2 = ox_build_child(parent2, parent1, start, end);

    (child1, child2)
}

/// Build one OX child: copy segment from `template`, fill from `donor`.
fn ox_build_child(template: &[usize], donor: &[usize], start: usize, end: usize) -> Vec<usize> {
    let n = template.len();
    let mut child = vec![usize::MAX; n];
    let mut in_segment = vec![false; n];

    for i in start..=end {
        child[i] = template[i];
        in_segment[template[i]] = true;
    }

    // Fill from donor, starting after the segment end and wrapping around.
    let mut pos = (end + 1) % n;
    for offset in 0..n {
        let val = donor[(end + 1 + offset) % n];
        if !in_segment[val] {
            child[pos] = val;
            pos = (pos + 1) % n;
        }
    }

    child
}

/// Partially Mapped Crossover (PMX) for permutations.
///
/// Preserves the **absolute position** of elements from both parents
/// as much as possible.
///
/// # Algorithm (Goldberg & Lingle, 1985)
///
/// 1. Select a random segment `[start, end]` from parent1
/// 2. Copy segment to child at the same positions
/// 3. For each element in parent2's segment that isn't in the child yet,
///    find its position through the mapping chain and place it there
/// 4. Fill remaining positions from parent2
///
/// Parents that are not permutations of the same `0..n` are returned as-is.
///
/// # Complexity
/// O(n) time, O(n) space
pub fn pmx_crossover(
    parent1: &[usize],
    parent2: &[usize],
    rng: &mut dyn RngCore,
) -> (Vec<usize>, Vec<usize>) {
    let n = parent1.len();
    if n < 2 || !compatible_permutations(parent1, parent2) {
        return (parent1.to_vec(), parent2.to_vec());
    }

    let (start, end) = random_segment(n, rng);

    let child1 = pmx_build_child(parent1, parent2, start, end);
    let child2 = pmx_build_child(parent2, parent1, start, end);

    (child1, child2)
}

/// Build one PMX child: copy segment from `template`, map from `donor`.
fn pmx_build_child(template: &[usize], donor: &[usize], start: usize, end: usize) -> Vec<usize> {
    let n = template.len();
    let sentinel = usize::MAX;
    let mut child = vec![sentinel; n];
    let mut placed = vec![false; n];

    let mut donor_pos = vec![0; n];
    for (i, &v) in donor.iter().enumerate() {
        donor_pos[v] = i;
    }

    for i in start..=end {
        child[i] = template[i];
        placed[template[i]] = true;
    }

    for i in start..=end {
        let donor_val = donor[i];
        if placed[donor_val] {
            continue;
        }
        // Follow template[pos] through the donor until we land outside the segment.
        let mut pos = i;
        loop {
            let target = donor_pos[template[pos]];
            if target < start || target > end {
                child[target] = donor_val;
                placed[donor_val] = true;
                break;
            }
            pos = target;
        }
    }

    for i in 0..n {
        if child[i] == sentinel {
            child[i] = donor[i];
        }
    }

    child
}

// ============================================================================
// Permutation mutation
// ============================================================================

/// Swap mutation: exchange two random positions.
///
/// # Complexity
/// O(1)
pub fn swap_mutation(perm: &mut [usize], rng: &mut dyn RngCore) {
    let n = perm.len();
    if n < 2 {
        return;
    }
    let i = rng.random_range(0..n);
    let j = rng.random_range(0..n);
    perm.swap(i, j);
}

/// Insert mutation: remove an element and reinsert at a random position.
///
/// # Complexity
/// O(n) due to array shifting
pub fn insert_mutation(perm: &mut Vec<usize>, rng: &mut dyn RngCore) {
    let n = perm.len();
    if n < 2 {
        return;
    }
    let from = rng.random_range(0..n);
    let item = perm.remove(from);
    let to = rng.random_range(0..n); // n-1 elements, n insertion points
    perm.insert(to, item);
}

/// Invert mutation: reverse a random segment (2-opt move).
///
/// # Complexity
/// O(n) worst case for segment reversal
pub fn invert_mutation(perm: &mut [usize], rng: &mut dyn RngCore) {
    let n = perm.len();
    if n < 2 {
        return;
    }
    let (start, end) = random_segment(n, rng);
    perm[start..=end].reverse();
}

/// Crossover strategy for permutation entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermutationCrossover {
    /// [`order_crossover`]
    #[default]
    Order,
    /// [`pmx_crossover`]
    PartiallyMapped,
}

impl Crossover<Vec<usize>> for PermutationCrossover {
    fn name(&self) -> &str {
        match self {
            PermutationCrossover::Order => "order",
            PermutationCrossover::PartiallyMapped => "pmx",
        }
    }

    fn crossover(
        &self,
        a: &Vec<usize>,
        b: &Vec<usize>,
        rng: &mut dyn RngCore,
    ) -> Result<(Vec<usize>, Vec<usize>), StrategyError> {
        Ok(match self {
            PermutationCrossover::Order => order_crossover(a, b, rng),
            PermutationCrossover::PartiallyMapped => pmx_crossover(a, b, rng),
        })
    }
}

/// Mutation strategy for permutation entities.
///
/// Applies one move with probability `rate * strength`; otherwise the
/// permutation is returned unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermutationMutation {
    /// [`swap_mutation`]
    #[default]
    Swap,
    /// [`insert_mutation`]
    Insert,
    /// [`invert_mutation`]
    Invert,
}

impl Mutation<Vec<usize>> for PermutationMutation {
    fn name(&self) -> &str {
        match self {
            PermutationMutation::Swap => "swap",
            PermutationMutation::Insert => "insert",
            PermutationMutation::Invert => "invert",
        }
    }

    fn mutate(
        &self,
        entity: &Vec<usize>,
        options: &MutationOptions,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<usize>, StrategyError> {
        let mut perm = entity.clone();
        if rng.random_range(0.0..1.0) < options.rate * options.strength {
            match self {
                PermutationMutation::Swap => swap_mutation(&mut perm, rng),
                PermutationMutation::Insert => insert_mutation(&mut perm, rng),
                PermutationMutation::Invert => invert_mutation(&mut perm, rng),
            }
        }
        Ok(perm)
    }
}

// ============================================================================
// Vector and string operators
// ============================================================================

/// Flips each bit independently with probability `rate * strength`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitFlipMutation;

impl Mutation<Vec<bool>> for BitFlipMutation {
    fn name(&self) -> &str {
        "bit-flip"
    }

    fn mutate(
        &self,
        entity: &Vec<bool>,
        options: &MutationOptions,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<bool>, StrategyError> {
        let p = options.rate * options.strength;
        Ok(entity
            .iter()
            .map(|&bit| if rng.random_range(0.0..1.0) < p { !bit } else { bit })
            .collect())
    }
}

/// Replaces each character independently, with probability
/// `rate * strength`, by a random character from an alphabet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharMutation {
    alphabet: Vec<char>,
}

impl CharMutation {
    pub fn new(alphabet: &str) -> Self {
        Self {
            alphabet: alphabet.chars().collect(),
        }
    }

    /// Lowercase ASCII letters and space.
    pub fn lowercase() -> Self {
        Self::new("abcdefghijklmnopqrstuvwxyz ")
    }

    pub fn alphabet(&self) -> &[char] {
        &self.alphabet
    }
}

impl Mutation<String> for CharMutation {
    fn name(&self) -> &str {
        "char"
    }

    fn mutate(
        &self,
        entity: &String,
        options: &MutationOptions,
        rng: &mut dyn RngCore,
    ) -> Result<String, StrategyError> {
        if self.alphabet.is_empty() {
            return Err(StrategyError::new("character alphabet is empty"));
        }
        let p = options.rate * options.strength;
        Ok(entity
            .chars()
            .map(|c| {
                if rng.random_range(0.0..1.0) < p {
                    self.alphabet[rng.random_range(0..self.alphabet.len())]
                } else {
                    c
                }
            })
            .collect())
    }
}

/// Swaps each gene between the parents with probability 0.5.
///
/// Parents of different lengths are returned as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformCrossover;

impl<T: Clone + Send + Sync> Crossover<Vec<T>> for UniformCrossover {
    fn name(&self) -> &str {
        "uniform"
    }

    fn crossover(
        &self,
        a: &Vec<T>,
        b: &Vec<T>,
        rng: &mut dyn RngCore,
    ) -> Result<(Vec<T>, Vec<T>), StrategyError> {
        let mut child1 = a.clone();
        let mut child2 = b.clone();
        if a.len() == b.len() {
            for i in 0..a.len() {
                if rng.random_bool(0.5) {
                    std::mem::swap(&mut child1[i], &mut child2[i]);
                }
            }
        }
        Ok((child1, child2))
    }
}

// ============================================================================
// Representations
// ============================================================================

/// Normalized Hamming distance over vectors.
///
/// Positions beyond the shorter vector count as mismatches.
#[derive(Debug, Clone, Copy, Default)]
pub struct HammingRepresentation;

impl<T: Clone + PartialEq + Send + Sync> Representation<Vec<T>> for HammingRepresentation {
    type Genome = Vec<T>;

    fn encode(&self, entity: &Vec<T>) -> Vec<T> {
        entity.clone()
    }

    fn decode(&self, genome: &Vec<T>) -> Option<Vec<T>> {
        Some(genome.clone())
    }

    fn similarity(&self, a: &Vec<T>, b: &Vec<T>) -> f64 {
        let len = a.len().max(b.len());
        if len == 0 {
            return 0.0;
        }
        let mismatched = a.iter().zip(b).filter(|(x, y)| x != y).count() + a.len().abs_diff(b.len());
        mismatched as f64 / len as f64
    }
}

/// Levenshtein distance over characters, normalized by the longer string.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditDistanceRepresentation;

impl Representation<String> for EditDistanceRepresentation {
    type Genome = Vec<char>;

    fn encode(&self, entity: &String) -> Vec<char> {
        entity.chars().collect()
    }

    fn decode(&self, genome: &Vec<char>) -> Option<String> {
        Some(genome.iter().collect())
    }

    fn similarity(&self, a: &String, b: &String) -> f64 {
        let a = self.encode(a);
        let b = self.encode(b);
        let len = a.len().max(b.len());
        if len == 0 {
            return 0.0;
        }
        levenshtein(&a, &b) as f64 / len as f64
    }
}

/// Edit distance with unit costs, two-row dynamic programming.
///
/// # Complexity
/// O(|a| * |b|) time, O(|b|) space
fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

// ============================================================================
// Helpers
// ============================================================================

/// Pick a random segment `[start, end]` within `0..n` where `start <= end`.
fn random_segment(n: usize, rng: &mut dyn RngCore) -> (usize, usize) {
    let a = rng.random_range(0..n);
    let b = rng.random_range(0..n);
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn is_permutation(perm: &[usize]) -> bool {
    let n = perm.len();
    let mut seen = vec![false; n];
    for &v in perm {
        if v >= n || seen[v] {
            return false;
        }
        seen[v] = true;
    }
    true
}

fn compatible_permutations(a: &[usize], b: &[usize]) -> bool {
    a.len() == b.len() && is_permutation(a) && is_permutation(b)
}

// ============================================================================
// Tests
// ============================================================================
