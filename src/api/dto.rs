use serde::{Deserialize, Serialize};

use crate::engine::pipeline::{DEFAULT_BATCH_SIZE, DEFAULT_PROVIDER, DEFAULT_SEED, PredictionRequest};
use crate::engine::{DetailRecord, PredictionOutcome};
use ctr_types::{ConfigError, ExecutionMode, Platform};

pub const DEFAULT_POPULATION: usize = 1000;
pub const MAX_BATCH_REQUESTS: usize = 10;

/// POST /predict-ctr request
#[derive(Debug, Clone, Deserialize)]
pub struct CtrRequest {
    pub ad_text: String,
    #[serde(default = "default_platform")]
    pub ad_platform: String,
    #[serde(default = "default_population")]
    pub population_size: usize,
    /// `null` means the default seed.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub use_mock: bool,
    #[serde(default)]
    pub use_sync: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Bank file for this request only; the shared bank otherwise.
    #[serde(default)]
    pub identity_bank_path: Option<String>,
}

fn default_platform() -> String {
    Platform::Facebook.as_str().into()
}

fn default_population() -> usize {
    DEFAULT_POPULATION
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.into()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl CtrRequest {
    /// Engine request; fails only on an unknown platform.
    pub fn to_engine(&self) -> Result<PredictionRequest, ConfigError> {
        let platform: Platform = self.ad_platform.parse()?;
        Ok(
            PredictionRequest::new(self.ad_text.clone(), platform, self.population_size)
                .with_seed(self.seed.unwrap_or(DEFAULT_SEED))
                .with_provider(self.provider.clone())
                .with_model(self.model.clone())
                .with_batch_size(self.batch_size)
                .with_mock(self.use_mock)
                .with_mode(ExecutionMode::from_use_sync(self.use_sync))
                .with_api_key(self.api_key.clone()),
        )
    }
}

/// `?include_details=true`
#[derive(Debug, Default, Deserialize)]
pub struct PredictQuery {
    #[serde(default)]
    pub include_details: bool,
}

/// POST /predict-ctr response
#[derive(Debug, Serialize)]
pub struct CtrResponse {
    pub success: bool,
    pub ctr: f64,
    pub total_clicks: usize,
    pub total_identities: usize,
    pub runtime_seconds: f64,
    pub provider_used: String,
    pub model_used: String,
    pub processing_mode: &'static str,
    pub ad_platform: Platform,
    pub fallback_batches: usize,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detailed_results: Option<Vec<DetailRecord>>,
}

impl CtrResponse {
    pub fn from_outcome(
        outcome: &PredictionOutcome,
        platform: Platform,
        details: Option<Vec<DetailRecord>>,
    ) -> Self {
        let summary = &outcome.summary;
        Self {
            success: true,
            ctr: round_to(summary.ctr, 4),
            total_clicks: summary.total_clicks,
            total_identities: summary.total_identities,
            runtime_seconds: round_to(summary.runtime_seconds, 2),
            provider_used: summary.provider.clone(),
            model_used: summary.model.clone(),
            processing_mode: summary.mode.describe(),
            ad_platform: platform,
            fallback_batches: summary.fallback_batches,
            timestamp: timestamp(),
            detailed_results: details,
        }
    }
}

/// One entry of a batch response: a result or the error it produced.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BatchItem {
    Ok(CtrResponse),
    Err(ErrorBody),
}

/// JSON error body, also used inside batch responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

/// GET /health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub available_providers: Vec<String>,
    pub version: &'static str,
}

/// GET /identities response
#[derive(Debug, Serialize)]
pub struct IdentitiesResponse<'a> {
    pub path: String,
    pub categories: usize,
    pub bank: &'a silicon_sampler::IdentityBank,
}

/// POST /identities/reload response
#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub success: bool,
    pub path: String,
    pub categories: usize,
    pub timestamp: String,
}

pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn round_to(x: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (x * scale).round() / scale
}
