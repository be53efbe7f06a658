//! Batch orchestration.
//!
//! Splits a population into contiguous batches, dispatches them to a
//! predictor one at a time or concurrently, and reassembles the labels in
//! population order.
//!
//! # Design Principles
//!
//! - **Total**: every identity gets a label. A batch whose predictor fails
//!   twice, whose task dies, or that misses the deadline is labelled by the
//!   Mock and tagged `mock-fallback`.
//! - **Order-independent**: results are placed by batch index, so sync and
//!   concurrent runs of a deterministic predictor agree exactly.
//! - **Bounded**: concurrent mode never has more than `max_in_flight`
//!   batches awaiting a provider.

use std::sync::Arc;
use std::time::Duration;

use ctr_types::{
    AdContext, ExecutionMode, Identity, Prediction, PredictionSource, ProviderError,
    ValidationError,
};
use silicon_sampler::Population;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::mock::MockPredictor;
use super::predictor::ClickPredictor;

// =============================================================================
// Batches
// =============================================================================

/// A contiguous slice of the population sent to a predictor in one call.
#[derive(Debug, Clone)]
pub struct Batch {
    pub index: usize,
    /// Population index of the first identity.
    pub offset: usize,
    /// Seed of the population the batch was cut from.
    pub seed: u64,
    len: usize,
    population: Arc<[Identity]>,
}

impl Batch {
    /// Panics if `offset + len` exceeds the population.
    pub fn new(
        index: usize,
        offset: usize,
        len: usize,
        seed: u64,
        population: Arc<[Identity]>,
    ) -> Self {
        assert!(offset + len <= population.len(), "batch out of range");
        Self {
            index,
            offset,
            seed,
            len,
            population,
        }
    }

    pub fn identities(&self) -> &[Identity] {
        &self.population[self.offset..self.offset + self.len]
    }

    /// Identities paired with their population index.
    pub fn indexed(&self) -> impl Iterator<Item = (usize, &Identity)> {
        self.identities()
            .iter()
            .enumerate()
            .map(|(i, identity)| (self.offset + i, identity))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Cut `population` into batches of at most `batch_size`, in order.
pub fn partition(population: &Population, batch_size: usize) -> Result<Vec<Batch>, ValidationError> {
    if batch_size == 0 {
        return Err(ValidationError::ZeroBatchSize);
    }

    let shared = population.shared();
    Ok((0..population.len())
        .step_by(batch_size)
        .enumerate()
        .map(|(index, offset)| {
            let len = batch_size.min(population.len() - offset);
            Batch::new(index, offset, len, population.seed(), Arc::clone(&shared))
        })
        .collect())
}

// =============================================================================
// Configuration and results
// =============================================================================

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub batch_size: usize,
    pub mode: ExecutionMode,
    pub max_in_flight: usize,
    pub deadline: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            mode: ExecutionMode::Concurrent,
            max_in_flight: 8,
            deadline: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Labels for the whole population plus run bookkeeping.
#[derive(Debug, Clone)]
pub struct Orchestration {
    /// One prediction per identity, in population order.
    pub predictions: Vec<Prediction>,
    pub mode: ExecutionMode,
    pub batches: usize,
    pub fallback_batches: usize,
    pub runtime: Duration,
}

#[derive(Debug)]
struct BatchOutcome {
    predictions: Vec<Prediction>,
    fell_back: bool,
}

// =============================================================================
// Orchestrator
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct BatchOrchestrator {
    config: OrchestratorConfig,
}

impl BatchOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Label every identity in `population`.
    ///
    /// Only a zero batch size fails; provider trouble is absorbed by the
    /// retry and fallback policy.
    pub async fn run(
        &self,
        population: &Population,
        ad: &AdContext,
        predictor: Arc<dyn ClickPredictor>,
    ) -> Result<Orchestration, ValidationError> {
        let started = std::time::Instant::now();
        let batches = partition(population, self.config.batch_size)?;
        let deadline = self.config.deadline.map(|d| Instant::now() + d);

        tracing::debug!(
            batches = batches.len(),
            batch_size = self.config.batch_size,
            mode = ?self.config.mode,
            provider = predictor.provider(),
            "dispatching batches"
        );

        let mut slots: Vec<Option<BatchOutcome>> = match self.config.mode {
            ExecutionMode::Sync => run_sync(&batches, ad, predictor, deadline).await,
            ExecutionMode::Concurrent => {
                run_concurrent(
                    &batches,
                    ad,
                    predictor,
                    self.config.max_in_flight,
                    deadline,
                )
                .await
            }
        };

        let mut predictions = Vec::with_capacity(population.len());
        let mut fallback_batches = 0;
        for batch in &batches {
            let outcome = match slots[batch.index].take() {
                Some(outcome) => outcome,
                None => {
                    tracing::warn!(batch = batch.index, "batch unresolved, using mock fallback");
                    mock_fallback(batch, ad)
                }
            };
            fallback_batches += usize::from(outcome.fell_back);
            predictions.extend(outcome.predictions);
        }

        let runtime = started.elapsed();
        tracing::info!(
            identities = predictions.len(),
            batches = batches.len(),
            fallback_batches,
            runtime_ms = runtime.as_millis() as u64,
            mode = self.config.mode.describe(),
            "orchestration complete"
        );

        Ok(Orchestration {
            predictions,
            mode: self.config.mode,
            batches: batches.len(),
            fallback_batches,
            runtime,
        })
    }
}

async fn run_sync(
    batches: &[Batch],
    ad: &AdContext,
    predictor: Arc<dyn ClickPredictor>,
    deadline: Option<Instant>,
) -> Vec<Option<BatchOutcome>> {
    let ad = Arc::new(ad.clone());
    let mut slots = Vec::with_capacity(batches.len());

    for batch in batches {
        // One task per batch: a panic surfaces as a JoinError, as in concurrent mode.
        let mut task = tokio::spawn(resolve_owned(
            Arc::clone(&predictor),
            batch.clone(),
            Arc::clone(&ad),
        ));

        let joined = match deadline {
            Some(at) => match tokio::time::timeout_at(at, &mut task).await {
                Ok(joined) => Some(joined),
                Err(_) => {
                    task.abort();
                    None
                }
            },
            None => Some(task.await),
        };

        let outcome = match joined {
            Some(Ok(outcome)) => Some(outcome),
            Some(Err(e)) => {
                tracing::warn!(batch = batch.index, error = %e, "batch task failed");
                None
            }
            None => {
                tracing::warn!(batch = batch.index, "deadline passed before batch completed");
                None
            }
        };
        slots.push(outcome);
    }
    slots
}

async fn run_concurrent(
    batches: &[Batch],
    ad: &AdContext,
    predictor: Arc<dyn ClickPredictor>,
    max_in_flight: usize,
    deadline: Option<Instant>,
) -> Vec<Option<BatchOutcome>> {
    let semaphore = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let ad = Arc::new(ad.clone());
    let mut tasks = JoinSet::new();

    for batch in batches.iter().cloned() {
        let semaphore = Arc::clone(&semaphore);
        let predictor = Arc::clone(&predictor);
        let ad = Arc::clone(&ad);
        tasks.spawn(async move {
            // The semaphore is never closed, so acquisition only fails on shutdown.
            let _permit = semaphore.acquire_owned().await.ok();
            let index = batch.index;
            (index, resolve_owned(predictor, batch, ad).await)
        });
    }

    let mut slots: Vec<Option<BatchOutcome>> = (0..batches.len()).map(|_| None).collect();
    match deadline {
        Some(at) => {
            if tokio::time::timeout_at(at, drain(&mut tasks, &mut slots))
                .await
                .is_err()
            {
                tracing::warn!(
                    pending = tasks.len(),
                    "deadline passed, abandoning pending batches"
                );
                tasks.abort_all();
            }
        }
        None => drain(&mut tasks, &mut slots).await,
    }
    slots
}

async fn drain(
    tasks: &mut JoinSet<(usize, BatchOutcome)>,
    slots: &mut [Option<BatchOutcome>],
) {
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => slots[index] = Some(outcome),
            Err(e) => tracing::warn!(error = %e, "batch task failed"),
        }
    }
}

async fn resolve_owned(
    predictor: Arc<dyn ClickPredictor>,
    batch: Batch,
    ad: Arc<AdContext>,
) -> BatchOutcome {
    resolve_batch(predictor.as_ref(), &batch, &ad).await
}

/// One attempt, one retry, then the Mock.
async fn resolve_batch(
    predictor: &dyn ClickPredictor,
    batch: &Batch,
    ad: &AdContext,
) -> BatchOutcome {
    for attempt in 1..=2 {
        match attempt_batch(predictor, batch, ad).await {
            Ok(predictions) => {
                return BatchOutcome {
                    predictions,
                    fell_back: false,
                };
            }
            Err(e) => tracing::warn!(
                batch = batch.index,
                attempt,
                kind = %e.kind,
                error = %e,
                "provider call failed"
            ),
        }
    }

    tracing::warn!(batch = batch.index, provider = predictor.provider(), "falling back to mock");
    mock_fallback(batch, ad)
}

fn mock_fallback(batch: &Batch, ad: &AdContext) -> BatchOutcome {
    BatchOutcome {
        predictions: MockPredictor::new().label_batch(batch, ad, PredictionSource::MockFallback),
        fell_back: true,
    }
}

async fn attempt_batch(
    predictor: &dyn ClickPredictor,
    batch: &Batch,
    ad: &AdContext,
) -> Result<Vec<Prediction>, ProviderError> {
    let predictions = predictor.predict(batch, ad).await?;
    if predictions.len() != batch.len() {
        let mismatch = ValidationError::PredictionCount {
            expected: batch.len(),
            got: predictions.len(),
        };
        return Err(ProviderError::malformed(predictor.provider(), mismatch.to_string()));
    }
    Ok(predictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctr_types::Platform;

    fn population(n: usize) -> Population {
        let identities = (0..n)
            .map(|i| Identity::from_pairs([("id", i as i64)]))
            .collect();
        Population::new(42, identities)
    }

    #[test]
    fn test_partition_covers_population_exactly() {
        let population = population(105);
        let batches = partition(&population, 50).unwrap();

        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![50, 50, 5]);
        let offsets: Vec<usize> = batches.iter().map(|b| b.offset).collect();
        assert_eq!(offsets, vec![0, 50, 100]);

        let covered: Vec<usize> = batches.iter().flat_map(|b| b.indexed().map(|(i, _)| i)).collect();
        assert_eq!(covered, (0..105).collect::<Vec<_>>());
    }

    #[test]
    fn test_partition_smaller_than_batch() {
        let batches = partition(&population(3), 200).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(batches[0].seed, 42);
    }

    #[test]
    fn test_partition_rejects_zero_batch_size() {
        assert_eq!(
            partition(&population(3), 0).unwrap_err(),
            ValidationError::ZeroBatchSize
        );
    }

    #[tokio::test]
    async fn test_mock_run_has_no_fallbacks() {
        let orchestrator =
            BatchOrchestrator::new(OrchestratorConfig::default().with_batch_size(7));
        let ad = AdContext::new("coffee", Platform::Facebook);
        let run = orchestrator
            .run(&population(30), &ad, Arc::new(MockPredictor::new()))
            .await
            .unwrap();

        assert_eq!(run.predictions.len(), 30);
        assert_eq!(run.batches, 5);
        assert_eq!(run.fallback_batches, 0);
        assert!(
            run.predictions
                .iter()
                .all(|p| p.source == PredictionSource::Mock)
        );
    }
}
