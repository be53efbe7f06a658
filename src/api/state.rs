use std::sync::Arc;

use silicon_sampler::{IdentityBank, IdentityBankStore};

use super::error::ApiError;
use crate::config::StudioConfig;
use crate::engine::PredictorRegistry;

/// Shared state for all handlers
pub struct AppState {
    pub store: IdentityBankStore,
    pub registry: PredictorRegistry,
    pub config: StudioConfig,
}

impl AppState {
    pub fn new(config: StudioConfig) -> Arc<Self> {
        Self::with_registry(config, PredictorRegistry::with_defaults())
    }

    pub fn with_registry(config: StudioConfig, registry: PredictorRegistry) -> Arc<Self> {
        Arc::new(Self {
            store: IdentityBankStore::new(config.bank_path.clone()),
            registry,
            config,
        })
    }

    /// Active bank, loading it on first use.
    pub fn bank(&self) -> Result<Arc<IdentityBank>, ApiError> {
        self.store
            .get()
            .map_err(|e| ApiError::Unavailable(format!("identity bank unavailable: {}", e)))
    }
}
