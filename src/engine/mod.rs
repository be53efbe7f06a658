//! Prediction engine: predictors, batch orchestration and aggregation.

pub mod aggregator;
pub mod live;
pub mod mock;
pub mod orchestrator;
pub mod pipeline;
pub mod predictor;
mod prompt;

pub use aggregator::{CtrSummary, DetailRecord, RunInfo, aggregate, detail_records, export_details};
pub use live::LiveClient;
pub use mock::MockPredictor;
pub use orchestrator::{Batch, BatchOrchestrator, Orchestration, OrchestratorConfig, partition};
pub use pipeline::{PredictionOutcome, PredictionRequest, run_prediction};
pub use predictor::{ClickPredictor, PredictorRegistry, PredictorSpec, ProviderInfo};

use ctr_types::{ConfigError, ValidationError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to export detail records to {path}: {source}")]
    Export {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
