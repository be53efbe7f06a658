//! Error taxonomy shared by the sampler, the predictors and the pipeline.
//!
//! - [`ConfigError`]: bad bank or unknown provider/platform. Fails fast.
//! - [`ValidationError`]: bad request parameters. Fails fast.
//! - [`ProviderError`]: a live predictor failed. Recovered by the orchestrator.

use std::fmt;

use thiserror::Error;

/// Configuration problems detected before any sampling or prediction work.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("identity bank not readable at {path}: {source}")]
    BankIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("identity bank is not valid JSON: {0}")]
    BankParse(String),

    #[error("identity bank defines no categories")]
    EmptyBank,

    #[error("category '{0}' has no values")]
    EmptyCategory(String),

    #[error("category '{category}' has {values} values but {weights} weights")]
    WeightCountMismatch {
        category: String,
        values: usize,
        weights: usize,
    },

    #[error("category '{category}' has an invalid weight {weight}")]
    InvalidWeight { category: String, weight: f64 },

    #[error("category '{0}' weights sum to zero")]
    ZeroTotalWeight(String),

    #[error("conditional rule references unknown category '{0}'")]
    MissingCategory(String),

    #[error("conditional '{category}' triggers on a value of '{requires}' that is never sampled")]
    UnreachableCondition { category: String, requires: String },

    #[error("conditional rules on '{0}' form a cycle")]
    ConditionalCycle(String),

    #[error("unknown provider '{name}' (available: {available})")]
    UnknownProvider { name: String, available: String },

    #[error("unknown platform '{0}' (expected facebook, tiktok or amazon)")]
    UnknownPlatform(String),
}

/// Request parameters outside their accepted range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("population size must be positive")]
    ZeroPopulationSize,

    #[error("batch size must be positive")]
    ZeroBatchSize,

    #[error("population size must be between 1 and {max}, got {got}")]
    PopulationSize { got: usize, max: usize },

    #[error("batch size must be between 1 and {max}, got {got}")]
    BatchSize { got: usize, max: usize },

    #[error("ad text cannot be empty")]
    EmptyAdText,

    #[error("CTR is undefined for an empty population")]
    EmptyPopulation,

    #[error("expected {expected} predictions, got {got}")]
    PredictionCount { expected: usize, got: usize },

    #[error("batch request holds {got} entries, limit is {max}")]
    TooManyRequests { got: usize, max: usize },
}

/// Why a live provider call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    MissingCredential,
    Authentication,
    RateLimited,
    Network,
    Status(u16),
    MalformedResponse,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorKind::MissingCredential => write!(f, "missing credential"),
            ProviderErrorKind::Authentication => write!(f, "authentication failed"),
            ProviderErrorKind::RateLimited => write!(f, "rate limited"),
            ProviderErrorKind::Network => write!(f, "network failure"),
            ProviderErrorKind::Status(code) => write!(f, "HTTP {}", code),
            ProviderErrorKind::MalformedResponse => write!(f, "malformed response"),
        }
    }
}

/// A live predictor could not produce labels for a batch.
#[derive(Debug, Clone, Error)]
#[error("{provider}: {kind}: {detail}")]
pub struct ProviderError {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub detail: String,
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            kind,
            detail: detail.into(),
        }
    }

    pub fn malformed(provider: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::MalformedResponse, detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::new("openai", ProviderErrorKind::RateLimited, "slow down");
        assert_eq!(err.to_string(), "openai: rate limited: slow down");

        let err = ProviderError::new("deepseek", ProviderErrorKind::Status(502), "bad gateway");
        assert_eq!(err.to_string(), "deepseek: HTTP 502: bad gateway");
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::PopulationSize { got: 0, max: 10_000 };
        assert_eq!(
            err.to_string(),
            "population size must be between 1 and 10000, got 0"
        );
    }
}
