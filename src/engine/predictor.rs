//! The click predictor abstraction and the provider registry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ctr_types::{AdContext, ConfigError, Prediction, ProviderError};
use serde::Serialize;

use super::live::LiveClient;
use super::mock::{MOCK_MODEL, MockPredictor};
use super::orchestrator::Batch;

/// Produces one click label per identity in a batch.
///
/// Implementations return exactly `batch.len()` predictions in batch order,
/// or an error. Never a partial answer.
#[async_trait]
pub trait ClickPredictor: Send + Sync {
    /// Provider name as reported to clients.
    fn provider(&self) -> &str;

    /// Model name as reported to clients.
    fn model(&self) -> &str;

    async fn predict(&self, batch: &Batch, ad: &AdContext)
    -> Result<Vec<Prediction>, ProviderError>;
}

/// What a caller asks the registry for.
#[derive(Debug, Clone)]
pub struct PredictorSpec {
    pub provider: String,
    pub model: Option<String>,
    /// Overrides the provider's environment credential.
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl PredictorSpec {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: None,
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Public description of a registered provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub default_model: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,
}

type Factory = Arc<dyn Fn(&PredictorSpec) -> Arc<dyn ClickPredictor> + Send + Sync>;

/// Name → predictor factory lookup.
#[derive(Clone, Default)]
pub struct PredictorRegistry {
    entries: Vec<(ProviderInfo, Factory)>,
}

impl PredictorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `openai`, `deepseek` and `mock`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register(
            ProviderInfo {
                name: "openai".into(),
                default_model: LiveClient::OPENAI_DEFAULT_MODEL.into(),
                description: "OpenAI chat completions".into(),
                env_var: Some(LiveClient::OPENAI_KEY_ENV.into()),
            },
            |spec| Arc::new(LiveClient::openai(spec)),
        );
        registry.register(
            ProviderInfo {
                name: "deepseek".into(),
                default_model: LiveClient::DEEPSEEK_DEFAULT_MODEL.into(),
                description: "DeepSeek chat completions (OpenAI-compatible)".into(),
                env_var: Some(LiveClient::DEEPSEEK_KEY_ENV.into()),
            },
            |spec| Arc::new(LiveClient::deepseek(spec)),
        );
        registry.register(
            ProviderInfo {
                name: "mock".into(),
                default_model: MOCK_MODEL.into(),
                description: "Deterministic keyword heuristic, no network".into(),
                env_var: None,
            },
            |_| Arc::new(MockPredictor::new()),
        );

        registry
    }

    /// Add or replace a provider.
    pub fn register<F>(&mut self, info: ProviderInfo, factory: F)
    where
        F: Fn(&PredictorSpec) -> Arc<dyn ClickPredictor> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(factory);
        match self.entries.iter_mut().find(|(i, _)| i.name == info.name) {
            Some(entry) => *entry = (info, factory),
            None => self.entries.push((info, factory)),
        }
    }

    pub fn create(&self, spec: &PredictorSpec) -> Result<Arc<dyn ClickPredictor>, ConfigError> {
        let (_, factory) = self.lookup(&spec.provider)?;
        Ok(factory(spec))
    }

    /// Registered description of `name` (case-insensitive).
    pub fn info(&self, name: &str) -> Result<&ProviderInfo, ConfigError> {
        self.lookup(name).map(|(info, _)| info)
    }

    fn lookup(&self, name: &str) -> Result<&(ProviderInfo, Factory), ConfigError> {
        let wanted = name.trim().to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(info, _)| info.name == wanted)
            .ok_or_else(|| ConfigError::UnknownProvider {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(i, _)| i.name.as_str()).collect()
    }

    pub fn providers(&self) -> impl Iterator<Item = &ProviderInfo> {
        self.entries.iter().map(|(i, _)| i)
    }
}

impl std::fmt::Debug for PredictorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictorRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
