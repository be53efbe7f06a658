//! Runtime configuration.
//!
//! Defaults suit local development; every field can be overridden through
//! `CTR_*` environment variables or CLI flags.

use std::path::PathBuf;
use std::time::Duration;

/// Default location of the shipped identity bank.
pub const DEFAULT_BANK_PATH: &str = "data/identity_bank.json";

/// Service and orchestration settings.
#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub bank_path: PathBuf,
    pub host: String,
    pub port: u16,
    /// Maximum batches in flight in concurrent mode.
    pub max_in_flight: usize,
    /// Per-call timeout for live providers.
    pub provider_timeout: Duration,
    /// Whole-request deadline; batches still pending fall back to the Mock.
    pub deadline: Option<Duration>,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            bank_path: PathBuf::from(DEFAULT_BANK_PATH),
            host: "0.0.0.0".into(),
            port: 8080,
            max_in_flight: 8,
            provider_timeout: Duration::from_secs(60),
            deadline: None,
        }
    }
}

impl StudioConfig {
    /// Load from environment, falling back to defaults for anything unset or
    /// unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bank_path: std::env::var("CTR_BANK_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.bank_path),
            host: std::env::var("CTR_HOST").unwrap_or(defaults.host),
            port: env_parse("CTR_PORT").unwrap_or(defaults.port),
            max_in_flight: env_parse("CTR_MAX_IN_FLIGHT")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_in_flight),
            provider_timeout: env_parse("CTR_PROVIDER_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.provider_timeout),
            deadline: env_parse("CTR_DEADLINE_SECS").map(Duration::from_secs),
        }
    }

    pub fn with_bank_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.bank_path = path.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_max_in_flight(mut self, n: usize) -> Self {
        self.max_in_flight = n.max(1);
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Socket address string for binding.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
