//! One prediction request end to end: validate, sample, orchestrate, aggregate.

use ctr_types::{AdContext, ExecutionMode, Platform, Prediction, ValidationError};
use silicon_sampler::{IdentityBank, Population, sample};

use super::aggregator::{CtrSummary, DetailRecord, RunInfo, aggregate, detail_records};
use super::mock::MOCK_PROVIDER;
use super::orchestrator::{BatchOrchestrator, OrchestratorConfig};
use super::predictor::{PredictorRegistry, PredictorSpec};
use super::EngineError;
use crate::config::StudioConfig;

pub const MAX_POPULATION: usize = 10_000;
pub const MAX_BATCH_SIZE: usize = 200;
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_PROVIDER: &str = "openai";

/// Parameters of one CTR estimate.
#[derive(Debug, Clone)]
pub struct PredictionRequest {
    pub ad_text: String,
    pub platform: Platform,
    pub population_size: usize,
    pub seed: u64,
    pub provider: String,
    pub model: Option<String>,
    pub batch_size: usize,
    pub use_mock: bool,
    pub mode: ExecutionMode,
    pub api_key: Option<String>,
}

impl PredictionRequest {
    pub fn new(ad_text: impl Into<String>, platform: Platform, population_size: usize) -> Self {
        Self {
            ad_text: ad_text.into(),
            platform,
            population_size,
            seed: DEFAULT_SEED,
            provider: DEFAULT_PROVIDER.into(),
            model: None,
            batch_size: DEFAULT_BATCH_SIZE,
            use_mock: false,
            mode: ExecutionMode::Concurrent,
            api_key: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_mock(mut self, use_mock: bool) -> Self {
        self.use_mock = use_mock;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.ad_text.trim().is_empty() {
            return Err(ValidationError::EmptyAdText);
        }
        if !(1..=MAX_POPULATION).contains(&self.population_size) {
            return Err(ValidationError::PopulationSize {
                got: self.population_size,
                max: MAX_POPULATION,
            });
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(ValidationError::BatchSize {
                got: self.batch_size,
                max: MAX_BATCH_SIZE,
            });
        }
        Ok(())
    }

    pub fn ad(&self) -> AdContext {
        AdContext::new(self.ad_text.trim(), self.platform)
    }
}

/// Summary plus what is needed to build detail records on demand.
#[derive(Debug, Clone)]
pub struct PredictionOutcome {
    pub summary: CtrSummary,
    pub population: Population,
    pub predictions: Vec<Prediction>,
}

impl PredictionOutcome {
    pub fn details(&self) -> Result<Vec<DetailRecord>, ValidationError> {
        detail_records(&self.population, &self.predictions)
    }
}

/// Run one request against `bank`.
///
/// Configuration and validation problems fail before any sampling; provider
/// failures never surface here.
pub async fn run_prediction(
    request: &PredictionRequest,
    bank: &IdentityBank,
    registry: &PredictorRegistry,
    config: &StudioConfig,
) -> Result<PredictionOutcome, EngineError> {
    request.validate()?;

    // An unknown provider is rejected even when the Mock was asked for.
    registry.info(&request.provider)?;
    let spec = if request.use_mock {
        PredictorSpec::new(MOCK_PROVIDER)
    } else {
        PredictorSpec::new(&request.provider)
            .with_model(request.model.clone())
            .with_api_key(request.api_key.clone())
            .with_timeout(config.provider_timeout)
    };
    let predictor = registry.create(&spec)?;

    tracing::info!(
        provider = predictor.provider(),
        model = predictor.model(),
        population = request.population_size,
        seed = request.seed,
        batch_size = request.batch_size,
        mode = request.mode.describe(),
        platform = %request.platform,
        "ctr prediction started"
    );

    let population = sample(bank, request.population_size, request.seed)?;

    let orchestrator = BatchOrchestrator::new(
        OrchestratorConfig::default()
            .with_batch_size(request.batch_size)
            .with_mode(request.mode)
            .with_max_in_flight(config.max_in_flight)
            .with_deadline(config.deadline),
    );
    let run = orchestrator
        .run(&population, &request.ad(), predictor.clone())
        .await?;

    let info = RunInfo::from_orchestration(&run, predictor.provider(), predictor.model());
    let summary = aggregate(&population, &run.predictions, info)?;

    tracing::info!(
        ctr = summary.ctr,
        clicks = summary.total_clicks,
        identities = summary.total_identities,
        fallback_batches = summary.fallback_batches,
        runtime_seconds = summary.runtime_seconds,
        "ctr prediction complete"
    );

    Ok(PredictionOutcome {
        summary,
        population,
        predictions: run.predictions,
    })
}
