//! Generational evolution engine.
//!
//! A generic, domain-agnostic engine built on trait-based strategies.
//! Callers supply a fitness function and an initial population; the engine
//! drives the loop and yields one immutable [`GenerationState`] per
//! generation through a lazy iterator.
//!
//! # Core Traits
//!
//! - [`Fitness`]: scores an entity (required)
//! - [`Selection`], [`Crossover`], [`Mutation`]: breeding strategies
//! - [`Representation`]: dissimilarity metric for diversity measurement
//! - [`Observer`]: receives lifecycle events and recovered failures
//!
//! # Key Types
//!
//! - [`EvolutionConfig`]: loop parameters, termination criteria, presets
//! - [`GenerationEngine`]: a configured engine; [`EngineBuilder`] assembles one
//! - [`Generations`]: the lazy sequence of generation snapshots
//! - [`Evaluator`]: bounded-concurrency fitness evaluation with timeouts
//!
//! # Submodules
//!
//! - [`operators`]: ready-made operators for permutations, bit vectors,
//!   strings, and generic vectors
//! - [`diversity`]: population diversity estimation
//!
//! # References
//!
//! - Holland (1975), *Adaptation in Natural and Artificial Systems*
//! - Goldberg (1989), *Genetic Algorithms in Search, Optimization, and Machine Learning*
//! - De Jong (2006), *Evolutionary Computation: A Unified Approach*

mod breeder;
mod config;
pub mod diversity;
mod error;
mod evaluator;
mod observer;
pub mod operators;
mod runner;
mod selection;
mod state;
mod types;

pub use breeder::{merge_elites, select_elites, Breeder};
pub use config::{EvolutionConfig, TerminationCriterion, NO_IMPROVEMENT_EPSILON};
pub use diversity::estimate_diversity;
pub use error::{ConfigError, EngineError, StrategyError};
pub use evaluator::{Evaluation, Evaluator};
pub use observer::{EngineEvent, EngineWarning, LogObserver, Observer, StopReason, WarningKind};
pub use runner::{evolve, EngineBuilder, GenerationEngine, Generations};
pub use selection::SelectionMethod;
pub use state::{GenerationState, FITNESS_HISTORY_LIMIT};
pub use types::{
    Crossover, Dissimilarity, Entity, EqualitySimilarity, EvaluationContext, Fitness, Metadata,
    Mutation, MutationOptions, NoCrossover, NoMutation, Representation, ScoreMap, Scored,
    Selection, SelectionOptions,
};
