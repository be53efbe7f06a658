//! Shared value types for CTR Studio.
//!
//! Identities are produced by `silicon-sampler`, predictions by the click
//! predictors in the main crate. Both sides agree on the types here.

pub mod error;

pub use error::{ConfigError, ProviderError, ProviderErrorKind, ValidationError};

use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

// =============================================================================
// Identity
// =============================================================================

/// One sampled attribute value. Bank files use plain JSON scalars.
///
/// Whole numbers parse as `Int`; anything with a fraction or exponent as
/// `Float`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::Float(x) => write!(f, "{}", x),
            AttributeValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Int(i)
    }
}

impl From<f64> for AttributeValue {
    fn from(x: f64) -> Self {
        AttributeValue::Float(x)
    }
}

/// One synthetic demographic record.
///
/// Attributes keep sampling order: unconditional categories in bank order,
/// each followed by whichever conditional fields it triggered.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Identity {
    attributes: Vec<(String, AttributeValue)>,
}

impl Identity {
    pub fn new(attributes: Vec<(String, AttributeValue)>) -> Self {
        Self { attributes }
    }

    /// Build from borrowed pairs (mostly for tests and fixtures).
    pub fn from_pairs<'a, I, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Into<AttributeValue>,
    {
        Self {
            attributes: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn attributes(&self) -> &[(String, AttributeValue)] {
        &self.attributes
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.attributes.len()))?;
        for (name, value) in &self.attributes {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

// =============================================================================
// Ad context
// =============================================================================

/// Where the ad is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    Tiktok,
    Amazon,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Facebook, Platform::Tiktok, Platform::Amazon];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Tiktok => "tiktok",
            Platform::Amazon => "amazon",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "facebook" => Ok(Platform::Facebook),
            "tiktok" => Ok(Platform::Tiktok),
            "amazon" => Ok(Platform::Amazon),
            other => Err(ConfigError::UnknownPlatform(other.to_string())),
        }
    }
}

/// The ad under evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdContext {
    pub text: String,
    pub platform: Platform,
}

impl AdContext {
    pub fn new(text: impl Into<String>, platform: Platform) -> Self {
        Self {
            text: text.into(),
            platform,
        }
    }
}

// =============================================================================
// Predictions
// =============================================================================

/// Which path produced a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PredictionSource {
    /// A live provider answered.
    Live,
    /// The Mock heuristic was requested directly.
    Mock,
    /// The Mock heuristic stood in after a live failure or a missed deadline.
    MockFallback,
}

/// A binary click decision for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Prediction {
    pub clicked: bool,
    pub source: PredictionSource,
}

impl Prediction {
    pub fn new(clicked: bool, source: PredictionSource) -> Self {
        Self { clicked, source }
    }

    /// 0 or 1.
    pub fn label(&self) -> u8 {
        u8::from(self.clicked)
    }
}

/// How batches are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Sync,
    #[default]
    Concurrent,
}

impl ExecutionMode {
    pub fn from_use_sync(use_sync: bool) -> Self {
        if use_sync {
            ExecutionMode::Sync
        } else {
            ExecutionMode::Concurrent
        }
    }

    /// Human-readable label reported to API clients.
    pub fn describe(&self) -> &'static str {
        match self {
            ExecutionMode::Sync => "synchronous sequential",
            ExecutionMode::Concurrent => "asynchronous parallel",
        }
    }
}
