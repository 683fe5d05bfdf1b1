//! Domain-agnostic generational evolution engine.
//!
//! Runs an evolutionary search over caller-defined entities:
//!
//! - **Pluggable strategies**: fitness, selection, crossover, mutation, and
//!   a dissimilarity metric are all trait objects supplied by the caller.
//!   Only the fitness function is required.
//! - **Bounded concurrent evaluation**: fitness calls run on worker threads
//!   with a concurrency cap and an optional per-evaluation timeout. Failed,
//!   panicking, and timed-out evaluations fall back to a configured score.
//! - **Lazy generations**: a run is an iterator of immutable generation
//!   snapshots; no work is done past the last generation consumed.
//!
//! # Architecture
//!
//! The engine contains no domain-specific concepts. Entities are opaque
//! values that only need equality, hashing, and `Debug`; everything the
//! engine learns about them comes through the strategy traits in [`ga`].
//! Built-in operators for common encodings live in [`ga::operators`].

pub mod ga;
pub mod random;
