//! Concurrent fitness evaluation.
//!
//! [`Evaluator`] scores a population with at most `max_concurrency`
//! evaluations in flight. Failures never abort a run: an evaluation that
//! returns an error, panics, produces a non-finite score, or exceeds the
//! timeout is recorded with the configured fallback score and reported as a
//! warning.
//!
//! # Execution paths
//!
//! - **Timeout configured**: each evaluation runs on its own detached
//!   worker thread. The driver admits at most `max_concurrency` at a time
//!   and waits on a channel until the earliest deadline. A task that misses
//!   its deadline is abandoned: its slot is freed, its context is marked
//!   cancelled, and any late result is dropped.
//! - **No timeout, `parallel` feature**: a dedicated rayon pool with
//!   `max_concurrency` threads.
//! - **Otherwise**: sequential.

use super::config::EvolutionConfig;
use super::error::EngineError;
use super::observer::{EngineEvent, EngineWarning, Observer, WarningKind};
use super::types::{Entity, EvaluationContext, Fitness, Metadata, ScoreMap, Scored};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Scores produced for one population.
#[derive(Debug, Clone)]
pub struct Evaluation<E: Entity> {
    /// One entry per distinct entity in the population.
    pub scores: ScoreMap<E>,
    /// Metadata for entities whose fitness result carried any.
    pub metadata: HashMap<E, Metadata>,
    /// Number of entities that received the fallback score.
    pub failed: usize,
}

enum Outcome {
    Scored(Scored),
    Failed(String),
    TimedOut(Duration),
}

/// Runs a fitness strategy over a population under bounded concurrency.
#[derive(Clone)]
pub struct Evaluator<E> {
    fitness: Arc<dyn Fitness<E>>,
    max_concurrency: usize,
    timeout: Option<Duration>,
    fallback_score: f64,
    #[cfg(feature = "parallel")]
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl<E: Entity> Evaluator<E> {
    /// Creates an evaluator for the concurrency, timeout, and fallback
    /// settings of `config`.
    ///
    /// Fails only if the worker pool cannot be started.
    pub fn new(fitness: Arc<dyn Fitness<E>>, config: &EvolutionConfig) -> Result<Self, EngineError> {
        #[cfg(feature = "parallel")]
        let pool = if config.evaluation_timeout.is_none() && config.max_concurrency > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.max_concurrency)
                .thread_name(|i| format!("u-evolve-eval-{i}"))
                .build()
                .map_err(|e| EngineError::WorkerPool(e.to_string()))?;
            Some(Arc::new(pool))
        } else {
            None
        };

        Ok(Self {
            fitness,
            max_concurrency: config.max_concurrency.max(1),
            timeout: config.evaluation_timeout,
            fallback_score: config.fallback_score,
            #[cfg(feature = "parallel")]
            pool,
        })
    }

    /// Scores every distinct entity in `population`.
    ///
    /// Duplicates are evaluated once. The returned map holds exactly the
    /// distinct entities of the population, regardless of completion
    /// order.
    pub fn evaluate(
        &self,
        population: &[E],
        context: &EvaluationContext,
        observer: &dyn Observer,
    ) -> Evaluation<E> {
        let generation = context.generation();
        let started = Instant::now();
        observer.on_event(&EngineEvent::EvaluationStarted {
            generation,
            population_size: population.len(),
        });

        let mut seen = HashSet::with_capacity(population.len());
        let distinct: Vec<E> = population
            .iter()
            .filter(|e| seen.insert(*e))
            .cloned()
            .collect();

        let outcomes = match self.timeout {
            Some(timeout) => self.run_with_deadline(distinct, timeout, context),
            None => self.run_unbounded(distinct, context),
        };

        let mut scores = ScoreMap::with_capacity(outcomes.len());
        let mut metadata = HashMap::new();
        let mut failed = 0;
        for (entity, outcome) in outcomes {
            let failure = match outcome {
                Outcome::Scored(scored) if scored.is_well_formed() => {
                    if !scored.metadata.is_empty() {
                        metadata.insert(entity.clone(), scored.metadata);
                    }
                    scores.insert(entity, scored.score);
                    continue;
                }
                Outcome::Scored(scored) => (
                    WarningKind::MalformedScore,
                    format!("score {} is not a finite number", scored.score),
                ),
                Outcome::Failed(message) => (WarningKind::FitnessFailed, message),
                Outcome::TimedOut(limit) => (
                    WarningKind::FitnessTimedOut,
                    format!("exceeded {limit:?}"),
                ),
            };

            failed += 1;
            observer.on_event(&EngineEvent::Warning(EngineWarning {
                generation,
                kind: failure.0,
                strategy: self.fitness.name().to_string(),
                entity: format!("{entity:?}"),
                message: failure.1,
            }));
            scores.insert(entity, self.fallback_score);
        }

        let best_score = scores
            .values()
            .copied()
            .fold(None, |best: Option<f64>, s| Some(best.map_or(s, |b| b.max(s))))
            .unwrap_or(0.0);
        observer.on_event(&EngineEvent::EvaluationCompleted {
            generation,
            evaluated: scores.len(),
            failed,
            best_score,
            elapsed: started.elapsed(),
        });

        Evaluation {
            scores,
            metadata,
            failed,
        }
    }

    fn run_unbounded(&self, entities: Vec<E>, context: &EvaluationContext) -> Vec<(E, Outcome)> {
        #[cfg(feature = "parallel")]
        if let Some(pool) = &self.pool {
            let fitness = self.fitness.as_ref();
            return pool.install(|| {
                entities
                    .into_par_iter()
                    .map(|entity| {
                        let outcome = evaluate_one(fitness, &entity, &context.for_task());
                        (entity, outcome)
                    })
                    .collect()
            });
        }

        entities
            .into_iter()
            .map(|entity| {
                let outcome = evaluate_one(self.fitness.as_ref(), &entity, &context.for_task());
                (entity, outcome)
            })
            .collect()
    }

    fn run_with_deadline(
        &self,
        entities: Vec<E>,
        timeout: Duration,
        context: &EvaluationContext,
    ) -> Vec<(E, Outcome)> {
        let n = entities.len();
        let (tx, rx) = mpsc::channel::<(usize, Outcome)>();
        let mut outcomes: Vec<Option<Outcome>> = (0..n).map(|_| None).collect();
        let mut in_flight: HashMap<usize, (Instant, EvaluationContext)> = HashMap::new();
        let mut next = 0;

        while next < n || !in_flight.is_empty() {
            while next < n && in_flight.len() < self.max_concurrency {
                let idx = next;
                next += 1;

                let task_context = context.for_task();
                let worker_context = task_context.clone();
                let fitness = Arc::clone(&self.fitness);
                let entity = entities[idx].clone();
                let tx = tx.clone();
                let spawned = thread::Builder::new()
                    .name(format!("u-evolve-eval-{idx}"))
                    .spawn(move || {
                        let outcome = evaluate_one(fitness.as_ref(), &entity, &worker_context);
                        // The receiver is gone if this task already timed out.
                        let _ = tx.send((idx, outcome));
                    });

                match spawned {
                    Ok(_) => {
                        in_flight.insert(idx, (Instant::now() + timeout, task_context));
                    }
                    Err(err) => {
                        outcomes[idx] = Some(Outcome::Failed(format!(
                            "could not start evaluation thread: {err}"
                        )));
                    }
                }
            }

            let Some(earliest) = in_flight.values().map(|(deadline, _)| *deadline).min() else {
                continue;
            };

            match rx.recv_timeout(earliest.saturating_duration_since(Instant::now())) {
                Ok((idx, outcome)) => {
                    if in_flight.remove(&idx).is_some() {
                        outcomes[idx] = Some(outcome);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    let expired: Vec<usize> = in_flight
                        .iter()
                        .filter(|(_, (deadline, _))| *deadline <= now)
                        .map(|(idx, _)| *idx)
                        .collect();
                    for idx in expired {
                        if let Some((_, task_context)) = in_flight.remove(&idx) {
                            task_context.cancel();
                            outcomes[idx] = Some(Outcome::TimedOut(timeout));
                        }
                    }
                }
                // Unreachable while `tx` is alive.
                Err(RecvTimeoutError::Disconnected) => {
                    for (idx, (_, task_context)) in in_flight.drain() {
                        task_context.cancel();
                        outcomes[idx] = Some(Outcome::Failed("evaluation channel closed".into()));
                    }
                }
            }
        }

        entities
            .into_iter()
            .zip(outcomes)
            .map(|(entity, outcome)| {
                let outcome =
                    outcome.unwrap_or_else(|| Outcome::Failed("evaluation result lost".into()));
                (entity, outcome)
            })
            .collect()
    }
}

/// Runs one evaluation, converting a panic into a failure.
fn evaluate_one<E>(fitness: &dyn Fitness<E>, entity: &E, context: &EvaluationContext) -> Outcome {
    match panic::catch_unwind(AssertUnwindSafe(|| fitness.evaluate(entity, context))) {
        Ok(Ok(scored)) => Outcome::Scored(scored),
        Ok(Err(err)) => Outcome::Failed(err.to_string()),
        Err(payload) => Outcome::Failed(format!("fitness panicked: {}", panic_message(&*payload))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ga::StrategyError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn context() -> EvaluationContext {
        EvaluationContext::new(0, Arc::new(HashMap::new()))
    }

    fn config(max_concurrency: usize, timeout: Option<Duration>) -> EvolutionConfig {
        EvolutionConfig {
            max_concurrency,
            evaluation_timeout: timeout,
            ..EvolutionConfig::default()
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<EngineEvent>>);

    impl Observer for Recorder {
        fn on_event(&self, event: &EngineEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    impl Recorder {
        fn warnings(&self) -> Vec<EngineWarning> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    EngineEvent::Warning(w) => Some(w.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    /// Fails on entities starting with "err", panics on "panic", returns
    /// NaN on "nan", sleeps on "slow", otherwise scores by length.
    struct Scripted;

    impl Fitness<String> for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn evaluate(&self, entity: &String, _ctx: &EvaluationContext) -> Result<Scored, StrategyError> {
            if entity.starts_with("err") {
                return Err(StrategyError::new("refused"));
            }
            if entity.starts_with("panic") {
                panic!("exploded on {entity}");
            }
            if entity.starts_with("nan") {
                return Ok(Scored::new(f64::NAN));
            }
            if entity.starts_with("slow") {
                thread::sleep(Duration::from_millis(400));
            }
            Ok(Scored::new(entity.len() as f64).with_metadata("len", entity.len().to_string()))
        }
    }

    /// Tracks the peak number of simultaneous evaluations.
    struct Gauge {
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl Gauge {
        fn new() -> Self {
            Self {
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Fitness<String> for Gauge {
        fn evaluate(&self, entity: &String, _ctx: &EvaluationContext) -> Result<Scored, StrategyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(Scored::new(entity.len() as f64))
        }
    }

    #[test]
    fn test_scores_every_entity() {
        for (max_concurrency, timeout) in [(1, None), (4, None), (3, Some(Duration::from_secs(5)))] {
            let evaluator = Evaluator::<String>::new(Arc::new(Scripted), &config(max_concurrency, timeout)).unwrap();
            let pop = strings(&["a", "bb", "ccc", "dddd"]);
            let result = evaluator.evaluate(&pop, &context(), &Recorder::default());

            assert_eq!(result.scores.len(), 4);
            assert_eq!(result.scores["a"], 1.0);
            assert_eq!(result.scores["dddd"], 4.0);
            assert_eq!(result.failed, 0);
            assert_eq!(result.metadata["ccc"].get("len").map(String::as_str), Some("3"));
        }
    }

    #[test]
    fn test_failures_get_fallback_score() {
        let cfg = EvolutionConfig {
            fallback_score: -5.0,
            ..config(2, None)
        };
        let evaluator = Evaluator::<String>::new(Arc::new(Scripted), &cfg).unwrap();
        let recorder = Recorder::default();
        let pop = strings(&["ok", "error", "panic!", "nan"]);
        let result = evaluator.evaluate(&pop, &context(), &recorder);

        assert_eq!(result.scores.len(), 4);
        assert_eq!(result.scores["ok"], 2.0);
        assert_eq!(result.scores["error"], -5.0);
        assert_eq!(result.scores["panic!"], -5.0);
        assert_eq!(result.scores["nan"], -5.0);
        assert_eq!(result.failed, 3);

        let mut kinds: Vec<WarningKind> = recorder.warnings().iter().map(|w| w.kind).collect();
        kinds.sort_by_key(|k| format!("{k:?}"));
        assert_eq!(
            kinds,
            vec![
                WarningKind::FitnessFailed,
                WarningKind::FitnessFailed,
                WarningKind::MalformedScore
            ]
        );
        assert!(recorder
            .warnings()
            .iter()
            .any(|w| w.message.contains("exploded on panic!") && w.strategy == "scripted"));
    }

    #[test]
    fn test_timeout_records_fallback_and_bounds_wall_clock() {
        let evaluator = Evaluator::<String>::new(
            Arc::new(Scripted),
            &config(8, Some(Duration::from_millis(50))),
        )
        .unwrap();
        let recorder = Recorder::default();
        let pop = strings(&["slow1", "slow2", "slow3", "slow4", "fast"]);

        let started = Instant::now();
        let result = evaluator.evaluate(&pop, &context(), &recorder);
        let elapsed = started.elapsed();

        assert!(elapsed < Duration::from_millis(300), "took {elapsed:?}");
        assert_eq!(result.scores.len(), 5);
        assert_eq!(result.scores["fast"], 4.0);
        assert_eq!(result.scores["slow1"], 0.0);
        assert_eq!(result.failed, 4);
        assert!(recorder
            .warnings()
            .iter()
            .all(|w| w.kind == WarningKind::FitnessTimedOut));
    }

    #[test]
    fn test_timed_out_task_sees_cancellation() {
        static OBSERVED: AtomicBool = AtomicBool::new(false);

        struct Cooperative;

        impl Fitness<u32> for Cooperative {
            fn evaluate(&self, _e: &u32, ctx: &EvaluationContext) -> Result<Scored, StrategyError> {
                let started = Instant::now();
                while started.elapsed() < Duration::from_secs(2) {
                    if ctx.is_cancelled() {
                        OBSERVED.store(true, Ordering::SeqCst);
                        return Err(StrategyError::new("cancelled"));
                    }
                    thread::sleep(Duration::from_millis(2));
                }
                Ok(Scored::new(1.0))
            }
        }

        let evaluator =
            Evaluator::<u32>::new(Arc::new(Cooperative), &config(1, Some(Duration::from_millis(20)))).unwrap();
        let result = evaluator.evaluate(&[7u32], &context(), &Recorder::default());
        assert_eq!(result.scores[&7], 0.0);

        let waited = Instant::now();
        while !OBSERVED.load(Ordering::SeqCst) && waited.elapsed() < Duration::from_secs(1) {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(OBSERVED.load(Ordering::SeqCst));
    }

    #[test]
    fn test_concurrency_limit_with_timeout() {
        let gauge = Arc::new(Gauge::new());
        let evaluator = Evaluator::new(
            gauge.clone() as Arc<dyn Fitness<String>>,
            &config(2, Some(Duration::from_secs(5))),
        )
        .unwrap();
        let pop: Vec<String> = (0..8).map(|i| "x".repeat(i + 1)).collect();
        let result = evaluator.evaluate(&pop, &context(), &Recorder::default());

        assert_eq!(result.scores.len(), 8);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_concurrency_limit_with_pool() {
        let gauge = Arc::new(Gauge::new());
        let evaluator =
            Evaluator::new(gauge.clone() as Arc<dyn Fitness<String>>, &config(3, None)).unwrap();
        let pop: Vec<String> = (0..12).map(|i| "y".repeat(i + 1)).collect();
        let result = evaluator.evaluate(&pop, &context(), &Recorder::default());

        assert_eq!(result.scores.len(), 12);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_duplicates_evaluated_once() {
        let gauge = Arc::new(Gauge::new());
        let evaluator =
            Evaluator::new(gauge.clone() as Arc<dyn Fitness<String>>, &config(1, None)).unwrap();
        let pop = strings(&["a", "a", "b", "a"]);
        let result = evaluator.evaluate(&pop, &context(), &Recorder::default());

        assert_eq!(result.scores.len(), 2);
        assert_eq!(gauge.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_emits_start_and_stop_events() {
        let evaluator = Evaluator::<String>::new(Arc::new(Scripted), &config(1, None)).unwrap();
        let recorder = Recorder::default();
        evaluator.evaluate(&strings(&["ab", "error"]), &context(), &recorder);

        let events = recorder.0.lock().unwrap();
        assert_eq!(
            events.first(),
            Some(&EngineEvent::EvaluationStarted {
                generation: 0,
                population_size: 2
            })
        );
        match events.last() {
            Some(EngineEvent::EvaluationCompleted {
                evaluated,
                failed,
                best_score,
                ..
            }) => {
                assert_eq!(*evaluated, 2);
                assert_eq!(*failed, 1);
                assert_eq!(*best_score, 2.0);
            }
            other => panic!("unexpected last event {other:?}"),
        }
    }
}
