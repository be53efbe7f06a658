//! Live chat-completion predictors (OpenAI and DeepSeek).
//!
//! Both speak the OpenAI-compatible `/chat/completions` contract, so one
//! client covers them; only the model, credential and endpoint differ.

use async_trait::async_trait;
use ctr_types::{AdContext, Prediction, PredictionSource, ProviderError, ProviderErrorKind};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::orchestrator::Batch;
use super::predictor::{ClickPredictor, PredictorSpec};
use super::prompt;

/// One configured chat-completion endpoint.
pub struct LiveClient {
    provider: String,
    model: String,
    api_key: Option<String>,
    key_env: &'static str,
    base_url: String,
    http: Client,
}

impl LiveClient {
    pub const OPENAI_DEFAULT_MODEL: &'static str = "gpt-4o-mini";
    pub const OPENAI_KEY_ENV: &'static str = "OPENAI_API_KEY";
    pub const OPENAI_BASE_ENV: &'static str = "OPENAI_API_BASE";
    pub const OPENAI_DEFAULT_BASE: &'static str = "https://api.openai.com/v1";

    pub const DEEPSEEK_DEFAULT_MODEL: &'static str = "deepseek-chat";
    pub const DEEPSEEK_KEY_ENV: &'static str = "DEEPSEEK_API_KEY";
    pub const DEEPSEEK_BASE_ENV: &'static str = "DEEPSEEK_API_BASE";
    pub const DEEPSEEK_DEFAULT_BASE: &'static str = "https://api.deepseek.com";

    pub fn openai(spec: &PredictorSpec) -> Self {
        Self::from_env(
            "openai",
            spec,
            Self::OPENAI_DEFAULT_MODEL,
            Self::OPENAI_KEY_ENV,
            Self::OPENAI_BASE_ENV,
            Self::OPENAI_DEFAULT_BASE,
        )
    }

    pub fn deepseek(spec: &PredictorSpec) -> Self {
        Self::from_env(
            "deepseek",
            spec,
            Self::DEEPSEEK_DEFAULT_MODEL,
            Self::DEEPSEEK_KEY_ENV,
            Self::DEEPSEEK_BASE_ENV,
            Self::DEEPSEEK_DEFAULT_BASE,
        )
    }

    /// Credential from `spec.api_key`, else from `key_env`; endpoint from
    /// `base_env`, else the default.
    fn from_env(
        provider: &str,
        spec: &PredictorSpec,
        default_model: &str,
        key_env: &'static str,
        base_env: &str,
        default_base: &str,
    ) -> Self {
        let api_key = spec
            .api_key
            .clone()
            .or_else(|| std::env::var(key_env).ok())
            .filter(|k| !k.trim().is_empty());
        let base_url = std::env::var(base_env).unwrap_or_else(|_| default_base.to_string());
        let http = Client::builder()
            .timeout(spec.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            provider: provider.to_string(),
            model: spec
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            api_key,
            key_env,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    /// Point the client at another OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    fn error(&self, kind: ProviderErrorKind, detail: impl Into<String>) -> ProviderError {
        ProviderError::new(&self.provider, kind, detail)
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// Map a non-success HTTP status to a provider error kind.
pub(crate) fn classify_status(status: StatusCode) -> ProviderErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderErrorKind::Authentication,
        StatusCode::TOO_MANY_REQUESTS => ProviderErrorKind::RateLimited,
        other => ProviderErrorKind::Status(other.as_u16()),
    }
}

#[async_trait]
impl ClickPredictor for LiveClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn predict(
        &self,
        batch: &Batch,
        ad: &AdContext,
    ) -> Result<Vec<Prediction>, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            self.error(
                ProviderErrorKind::MissingCredential,
                format!("set {} or pass api_key", self.key_env),
            )
        })?;

        let body = json!({
            "model": self.model,
            "temperature": 0.0,
            "messages": [
                {"role": "system", "content": prompt::SYSTEM_PROMPT},
                {"role": "user", "content": prompt::build_user_prompt(batch, ad)},
            ],
        });

        tracing::debug!(provider = %self.provider, batch = batch.index, size = batch.len(), "calling provider");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.error(ProviderErrorKind::Network, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail: String = text.chars().take(200).collect();
            return Err(self.error(classify_status(status), detail));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| self.error(ProviderErrorKind::MalformedResponse, e.to_string()))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| self.error(ProviderErrorKind::MalformedResponse, "empty completion"))?;

        let labels = prompt::parse_labels(&content, batch.len())
            .map_err(|detail| self.error(ProviderErrorKind::MalformedResponse, detail))?;

        Ok(labels
            .into_iter()
            .map(|clicked| Prediction::new(clicked, PredictionSource::Live))
            .collect())
    }
}
