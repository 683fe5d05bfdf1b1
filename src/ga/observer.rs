//! Engine lifecycle events.
//!
//! The engine reports what it is doing through an [`Observer`]. Observers
//! are optional for correctness; the default [`LogObserver`] forwards every
//! event to the [`log`] facade.

use super::config::TerminationCriterion;
use std::fmt;
use std::time::Duration;

/// Why a run stopped producing generations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopReason {
    /// The configured generation budget was exhausted.
    GenerationLimit,
    /// A termination criterion was satisfied.
    Criterion(TerminationCriterion),
}

/// The kind of locally recovered failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    FitnessFailed,
    FitnessTimedOut,
    MalformedScore,
    MutationFailed,
    CrossoverFailed,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WarningKind::FitnessFailed => "fitness evaluation failed",
            WarningKind::FitnessTimedOut => "fitness evaluation timed out",
            WarningKind::MalformedScore => "fitness returned a malformed score",
            WarningKind::MutationFailed => "mutation failed",
            WarningKind::CrossoverFailed => "crossover failed",
        };
        f.write_str(s)
    }
}

/// A strategy failure the engine recovered from.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineWarning {
    pub generation: usize,
    pub kind: WarningKind,
    /// Name of the strategy that failed.
    pub strategy: String,
    /// `Debug` rendering of the affected entity.
    pub entity: String,
    pub message: String,
}

/// Something the engine did.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// `best_score` is the parent generation's best; `None` for generation 0.
    GenerationStarted {
        generation: usize,
        population_size: usize,
        best_score: Option<f64>,
    },
    GenerationCompleted {
        generation: usize,
        population_size: usize,
        best_score: f64,
        average_score: f64,
        diversity: f64,
    },
    EvaluationStarted {
        generation: usize,
        population_size: usize,
    },
    EvaluationCompleted {
        generation: usize,
        evaluated: usize,
        failed: usize,
        best_score: f64,
        elapsed: Duration,
    },
    Warning(EngineWarning),
    Terminated {
        generation: usize,
        best_score: f64,
        reason: StopReason,
    },
}

/// Receives engine events.
///
/// Called synchronously from the thread driving the run. Any
/// `Fn(&EngineEvent) + Send + Sync` closure is an observer.
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &EngineEvent);
}

impl<F> Observer for F
where
    F: Fn(&EngineEvent) + Send + Sync,
{
    fn on_event(&self, event: &EngineEvent) {
        self(event)
    }
}

/// Forwards events to the `log` facade.
///
/// Lifecycle events log at `debug`, warnings at `warn`, termination at
/// `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::GenerationStarted {
                generation,
                population_size,
                best_score: Some(best),
            } => {
                log::debug!("generation {generation} started: {population_size} entities, parent best {best:.4}");
            }
            EngineEvent::GenerationStarted {
                generation,
                population_size,
                best_score: None,
            } => {
                log::debug!("generation {generation} started: {population_size} entities");
            }
            EngineEvent::GenerationCompleted {
                generation,
                population_size,
                best_score,
                average_score,
                diversity,
            } => {
                log::debug!(
                    "generation {generation} completed: size={population_size} best={best_score:.6} avg={average_score:.6} diversity={diversity:.4}"
                );
            }
            EngineEvent::EvaluationStarted {
                generation,
                population_size,
            } => {
                log::debug!("generation {generation}: evaluating {population_size} entities");
            }
            EngineEvent::EvaluationCompleted {
                generation,
                evaluated,
                failed,
                best_score,
                elapsed,
            } => {
                log::debug!(
                    "generation {generation}: evaluated {evaluated} ({failed} failed) in {elapsed:?}, best={best_score:.6}"
                );
            }
            EngineEvent::Warning(w) => {
                log::warn!(
                    "generation {}: {} ({}) for {}: {}",
                    w.generation,
                    w.kind,
                    w.strategy,
                    w.entity,
                    w.message
                );
            }
            EngineEvent::Terminated {
                generation,
                best_score,
                reason,
            } => {
                log::info!("run terminated after generation {generation} ({reason:?}), best={best_score:.6}");
            }
        }
    }
}
