//! Turn per-identity predictions into a CTR summary and detail records.

use std::path::Path;
use std::time::Duration;

use ctr_types::{ExecutionMode, Identity, Prediction, PredictionSource, ValidationError};
use serde::Serialize;
use silicon_sampler::Population;

use super::EngineError;
use super::orchestrator::Orchestration;

/// Provenance of a run, carried into the summary.
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub provider: String,
    pub model: String,
    pub mode: ExecutionMode,
    pub runtime: Duration,
    pub batches: usize,
    pub fallback_batches: usize,
}

impl RunInfo {
    pub fn from_orchestration(
        run: &Orchestration,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            mode: run.mode,
            runtime: run.runtime,
            batches: run.batches,
            fallback_batches: run.fallback_batches,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CtrSummary {
    pub ctr: f64,
    pub total_clicks: usize,
    pub total_identities: usize,
    pub runtime_seconds: f64,
    pub provider: String,
    pub model: String,
    pub mode: ExecutionMode,
    pub batches: usize,
    pub fallback_batches: usize,
}

/// One identity and its label, for export or API detail output.
#[derive(Debug, Clone, Serialize)]
pub struct DetailRecord {
    pub id: usize,
    pub profile: Identity,
    pub click_prediction: u8,
    pub source: PredictionSource,
}

fn check_lengths(population: &Population, predictions: &[Prediction]) -> Result<(), ValidationError> {
    if population.is_empty() {
        return Err(ValidationError::EmptyPopulation);
    }
    if predictions.len() != population.len() {
        return Err(ValidationError::PredictionCount {
            expected: population.len(),
            got: predictions.len(),
        });
    }
    Ok(())
}

/// `ctr = clicks / identities`.
pub fn aggregate(
    population: &Population,
    predictions: &[Prediction],
    run: RunInfo,
) -> Result<CtrSummary, ValidationError> {
    check_lengths(population, predictions)?;

    let total_identities = population.len();
    let total_clicks = predictions.iter().filter(|p| p.clicked).count();

    Ok(CtrSummary {
        ctr: total_clicks as f64 / total_identities as f64,
        total_clicks,
        total_identities,
        runtime_seconds: run.runtime.as_secs_f64(),
        provider: run.provider,
        model: run.model,
        mode: run.mode,
        batches: run.batches,
        fallback_batches: run.fallback_batches,
    })
}

/// Pair identities with their labels in population order.
pub fn detail_records(
    population: &Population,
    predictions: &[Prediction],
) -> Result<Vec<DetailRecord>, ValidationError> {
    check_lengths(population, predictions)?;

    Ok(population
        .iter()
        .zip(predictions)
        .enumerate()
        .map(|(id, (identity, prediction))| DetailRecord {
            id,
            profile: identity.clone(),
            click_prediction: prediction.label(),
            source: prediction.source,
        })
        .collect())
}

/// Write records as pretty-printed JSON.
pub fn export_details(path: impl AsRef<Path>, records: &[DetailRecord]) -> Result<(), EngineError> {
    let path = path.as_ref();
    let export_error = |source: std::io::Error| EngineError::Export {
        path: path.display().to_string(),
        source,
    };

    let json = serde_json::to_string_pretty(records).map_err(|e| export_error(e.into()))?;
    std::fs::write(path, json).map_err(export_error)?;
    tracing::info!(path = %path.display(), records = records.len(), "detail records exported");
    Ok(())
}
