//! Identity bank: validated categorical distributions.
//!
//! A bank file maps category name to `{values, weights}` plus an optional
//! `conditional` map naming categories that are only drawn when a
//! prerequisite resolves to a trigger value:
//!
//! ```json
//! {
//!   "categories": {
//!     "health_status": {"values": [true, false], "weights": [0.3, 0.7]},
//!     "illness": {"values": ["asthma", "diabetes"]}
//!   },
//!   "conditional": {"illness": {"requires": "health_status", "when": true}}
//! }
//! ```
//!
//! Category order is file order and fixes the sampling order, so the bank is
//! parsed through `serde_json`'s order-preserving map.

use std::path::Path;

use ctr_types::{AttributeValue, ConfigError};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

// =============================================================================
// Category
// =============================================================================

/// One categorical distribution with precomputed cumulative bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    name: String,
    values: Vec<AttributeValue>,
    weights: Vec<f64>,
    /// Normalized prefix sums, same length as `values`.
    cumulative: Vec<f64>,
    /// Index returned when rounding leaves a draw above every bound.
    last_positive: usize,
}

impl Category {
    /// Validate and build a category. Missing weights mean uniform.
    pub fn new(
        name: impl Into<String>,
        values: Vec<AttributeValue>,
        weights: Option<Vec<f64>>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if values.is_empty() {
            return Err(ConfigError::EmptyCategory(name));
        }

        let weights = weights.unwrap_or_else(|| vec![1.0; values.len()]);
        if weights.len() != values.len() {
            return Err(ConfigError::WeightCountMismatch {
                category: name,
                values: values.len(),
                weights: weights.len(),
            });
        }
        if let Some(&bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(ConfigError::InvalidWeight {
                category: name,
                weight: bad,
            });
        }

        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(ConfigError::ZeroTotalWeight(name));
        }

        let mut acc = 0.0;
        let cumulative = weights
            .iter()
            .map(|w| {
                acc += w / total;
                acc
            })
            .collect();
        let last_positive = weights.iter().rposition(|w| *w > 0.0).unwrap_or(0);

        Ok(Self {
            name,
            values,
            weights,
            cumulative,
            last_positive,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[AttributeValue] {
        &self.values
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Select the value whose cumulative interval contains `u` in [0, 1).
    ///
    /// First index whose upper bound exceeds `u`; zero-weight values have an
    /// empty interval and are never selected.
    pub fn pick(&self, u: f64) -> &AttributeValue {
        let idx = self
            .cumulative
            .iter()
            .position(|&bound| bound > u)
            .unwrap_or(self.last_positive);
        &self.values[idx]
    }
}

/// A category that is only drawn when `requires` resolved to `when`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalRule {
    pub requires: String,
    #[serde(default = "default_trigger")]
    pub when: AttributeValue,
}

fn default_trigger() -> AttributeValue {
    AttributeValue::Bool(true)
}

// =============================================================================
// IdentityBank
// =============================================================================

/// Immutable, validated bank. Construct with [`IdentityBank::builder`],
/// [`IdentityBank::from_json_str`] or [`IdentityBank::from_path`].
#[derive(Debug, Clone)]
pub struct IdentityBank {
    categories: Vec<Category>,
    rules: Vec<Option<ConditionalRule>>,
    /// Unconditional category indices in bank order.
    roots: Vec<usize>,
    /// For each category, the conditional categories it can trigger.
    dependents: Vec<Vec<usize>>,
}

impl IdentityBank {
    pub fn builder() -> IdentityBankBuilder {
        IdentityBankBuilder::default()
    }

    /// Read, parse and validate a bank file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::BankIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Parse and validate a bank from its JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let raw: RawBank =
            serde_json::from_str(json).map_err(|e| ConfigError::BankParse(e.to_string()))?;

        let mut builder = Self::builder();
        for (name, spec) in raw.categories {
            let spec: RawCategory = serde_json::from_value(spec)
                .map_err(|e| ConfigError::BankParse(format!("category '{}': {}", name, e)))?;
            builder = builder.category_spec(name, spec.values, spec.weights);
        }
        for (name, rule) in raw.conditional {
            let rule: ConditionalRule = serde_json::from_value(rule)
                .map_err(|e| ConfigError::BankParse(format!("conditional '{}': {}", name, e)))?;
            builder = builder.conditional(name, rule.requires, rule.when);
        }
        builder.build()
    }

    /// All categories in bank order, conditional ones included.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn rule(&self, name: &str) -> Option<&ConditionalRule> {
        self.categories
            .iter()
            .position(|c| c.name == name)
            .and_then(|idx| self.rules[idx].as_ref())
    }

    pub(crate) fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub(crate) fn category_at(&self, idx: usize) -> &Category {
        &self.categories[idx]
    }

    pub(crate) fn dependents_of(&self, idx: usize) -> &[usize] {
        &self.dependents[idx]
    }

    /// Trigger value of the conditional category at `idx`.
    pub(crate) fn trigger_at(&self, idx: usize) -> Option<&AttributeValue> {
        self.rules[idx].as_ref().map(|r| &r.when)
    }
}

impl Serialize for IdentityBank {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("categories", &CategoriesView(&self.categories))?;
        map.serialize_entry(
            "conditional",
            &ConditionalView {
                categories: &self.categories,
                rules: &self.rules,
            },
        )?;
        map.end()
    }
}

struct CategoriesView<'a>(&'a [Category]);

impl Serialize for CategoriesView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Spec<'a> {
            values: &'a [AttributeValue],
            weights: &'a [f64],
        }

        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for c in self.0 {
            map.serialize_entry(
                &c.name,
                &Spec {
                    values: &c.values,
                    weights: &c.weights,
                },
            )?;
        }
        map.end()
    }
}

struct ConditionalView<'a> {
    categories: &'a [Category],
    rules: &'a [Option<ConditionalRule>],
}

impl Serialize for ConditionalView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (c, rule) in self.categories.iter().zip(self.rules) {
            if let Some(rule) = rule {
                map.serialize_entry(&c.name, rule)?;
            }
        }
        map.end()
    }
}

// =============================================================================
// Raw file shape
// =============================================================================

#[derive(Deserialize)]
struct RawBank {
    categories: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    conditional: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct RawCategory {
    values: Vec<AttributeValue>,
    #[serde(default, alias = "probs")]
    weights: Option<Vec<f64>>,
}

// =============================================================================
// Builder
// =============================================================================

/// Collects categories and rules, validating everything in [`build`].
///
/// [`build`]: IdentityBankBuilder::build
#[derive(Debug, Default)]
pub struct IdentityBankBuilder {
    categories: Vec<(String, Vec<AttributeValue>, Option<Vec<f64>>)>,
    conditionals: Vec<(String, ConditionalRule)>,
}

impl IdentityBankBuilder {
    /// Add a category from `(value, weight)` pairs.
    pub fn category<V, I>(self, name: impl Into<String>, pairs: I) -> Self
    where
        V: Into<AttributeValue>,
        I: IntoIterator<Item = (V, f64)>,
    {
        let (values, weights): (Vec<AttributeValue>, Vec<f64>) =
            pairs.into_iter().map(|(v, w)| (v.into(), w)).unzip();
        self.category_spec(name, values, Some(weights))
    }

    /// Add a category from parallel value/weight lists. A category with the
    /// same name replaces the earlier one in place.
    pub fn category_spec(
        mut self,
        name: impl Into<String>,
        values: Vec<AttributeValue>,
        weights: Option<Vec<f64>>,
    ) -> Self {
        let name = name.into();
        match self.categories.iter_mut().find(|(n, _, _)| *n == name) {
            Some(slot) => *slot = (name, values, weights),
            None => self.categories.push((name, values, weights)),
        }
        self
    }

    /// Make `category` conditional on `requires` resolving to `when`.
    pub fn conditional(
        mut self,
        category: impl Into<String>,
        requires: impl Into<String>,
        when: impl Into<AttributeValue>,
    ) -> Self {
        self.conditionals.push((
            category.into(),
            ConditionalRule {
                requires: requires.into(),
                when: when.into(),
            },
        ));
        self
    }

    pub fn build(self) -> Result<IdentityBank, ConfigError> {
        if self.categories.is_empty() {
            return Err(ConfigError::EmptyBank);
        }

        let categories = self
            .categories
            .into_iter()
            .map(|(name, values, weights)| Category::new(name, values, weights))
            .collect::<Result<Vec<_>, _>>()?;

        let index_of = |name: &str| categories.iter().position(|c| c.name == name);

        let mut rules: Vec<Option<ConditionalRule>> = vec![None; categories.len()];
        let mut parent: Vec<Option<usize>> = vec![None; categories.len()];
        for (name, rule) in self.conditionals {
            let idx = index_of(&name).ok_or_else(|| ConfigError::MissingCategory(name.clone()))?;
            let req = index_of(&rule.requires)
                .ok_or_else(|| ConfigError::MissingCategory(rule.requires.clone()))?;
            if !categories[req].values.contains(&rule.when) {
                return Err(ConfigError::UnreachableCondition {
                    category: name,
                    requires: rule.requires,
                });
            }
            parent[idx] = Some(req);
            rules[idx] = Some(rule);
        }

        // Every conditional chain must bottom out in an unconditional category.
        for start in 0..categories.len() {
            let mut seen = vec![false; categories.len()];
            let mut cur = start;
            while let Some(p) = parent[cur] {
                if seen[cur] {
                    return Err(ConfigError::ConditionalCycle(categories[start].name.clone()));
                }
                seen[cur] = true;
                cur = p;
            }
        }

        let roots = (0..categories.len())
            .filter(|&i| parent[i].is_none())
            .collect();
        let mut dependents = vec![Vec::new(); categories.len()];
        for (idx, p) in parent.iter().enumerate() {
            if let Some(p) = p {
                dependents[*p].push(idx);
            }
        }

        Ok(IdentityBank {
            categories,
            rules,
            roots,
            dependents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cumulative_pick() {
        let c = Category::new(
            "age",
            vec!["young".into(), "mid".into(), "old".into()],
            Some(vec![1.0, 2.0, 1.0]),
        )
        .unwrap();
        assert_eq!(c.pick(0.0).as_str(), Some("young"));
        assert_eq!(c.pick(0.2499).as_str(), Some("young"));
        assert_eq!(c.pick(0.25).as_str(), Some("mid"));
        assert_eq!(c.pick(0.7499).as_str(), Some("mid"));
        assert_eq!(c.pick(0.75).as_str(), Some("old"));
        assert_eq!(c.pick(0.999_999).as_str(), Some("old"));
    }

    #[test]
    fn test_zero_weight_value_never_picked() {
        let c = Category::new(
            "x",
            vec!["a".into(), "never".into(), "b".into(), "tail".into()],
            Some(vec![1.0, 0.0, 1.0, 0.0]),
        )
        .unwrap();
        for u in [0.0, 0.49, 0.5, 0.51, 0.99, 1.0] {
            assert_ne!(c.pick(u).as_str(), Some("never"));
            assert_ne!(c.pick(u).as_str(), Some("tail"));
        }
    }

    #[test]
    fn test_uniform_when_weights_missing() {
        let c = Category::new("coin", vec![true.into(), false.into()], None).unwrap();
        assert_eq!(c.weights(), &[1.0, 1.0]);
        assert_eq!(c.pick(0.49), &AttributeValue::Bool(true));
        assert_eq!(c.pick(0.5), &AttributeValue::Bool(false));
    }

    #[test]
    fn test_rejects_negative_weight() {
        let err = IdentityBank::builder()
            .category("age", [("young", 1.0), ("old", -0.5)])
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWeight { weight, .. } if weight == -0.5));
    }

    #[test]
    fn test_rejects_zero_total_weight() {
        let err = IdentityBank::builder()
            .category("age", [("young", 0.0), ("old", 0.0)])
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroTotalWeight(name) if name == "age"));
    }

    #[test]
    fn test_rejects_missing_conditional_category() {
        let err = IdentityBank::builder()
            .category("illness", [("flu", 1.0)])
            .conditional("illness", "health_status", true)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingCategory(name) if name == "health_status"));

        let err = IdentityBank::builder()
            .category("health_status", [(true, 1.0), (false, 1.0)])
            .conditional("illness", "health_status", true)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingCategory(name) if name == "illness"));
    }

    #[test]
    fn test_rejects_unreachable_trigger() {
        let err = IdentityBank::builder()
            .category("health_status", [(true, 1.0), (false, 1.0)])
            .category("illness", [("flu", 1.0)])
            .conditional("illness", "health_status", "yes")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnreachableCondition { .. }));
    }

    #[test]
    fn test_rejects_cycle() {
        let err = IdentityBank::builder()
            .category("a", [("x", 1.0)])
            .category("b", [("x", 1.0)])
            .conditional("a", "b", "x")
            .conditional("b", "a", "x")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ConditionalCycle(_)));
    }

    #[test]
    fn test_rejects_empty_and_mismatched() {
        assert!(matches!(
            IdentityBank::builder().build(),
            Err(ConfigError::EmptyBank)
        ));
        assert!(matches!(
            IdentityBank::from_json_str(r#"{"categories": {"a": {"values": []}}}"#),
            Err(ConfigError::EmptyCategory(_))
        ));
        assert!(matches!(
            IdentityBank::from_json_str(
                r#"{"categories": {"a": {"values": ["x", "y"], "weights": [1]}}}"#
            ),
            Err(ConfigError::WeightCountMismatch {
                values: 2,
                weights: 1,
                ..
            })
        ));
        assert!(matches!(
            IdentityBank::from_json_str("not json"),
            Err(ConfigError::BankParse(_))
        ));
    }

    #[test]
    fn test_json_preserves_file_order_and_accepts_probs() {
        let bank = IdentityBank::from_json_str(
            r#"{
                "categories": {
                    "zeta": {"values": ["z"]},
                    "alpha": {"values": ["a", "b"], "probs": [0.3, 0.7]},
                    "health_status": {"values": [true, false]},
                    "illness": {"values": ["flu"]}
                },
                "conditional": {"illness": {"requires": "health_status"}}
            }"#,
        )
        .unwrap();

        let names: Vec<&str> = bank.categories().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "health_status", "illness"]);
        assert_eq!(bank.category("alpha").unwrap().weights(), &[0.3, 0.7]);
        assert_eq!(
            bank.rule("illness").unwrap().when,
            AttributeValue::Bool(true)
        );
        assert!(bank.rule("alpha").is_none());
    }

    #[test]
    fn test_float_values_load() {
        let bank = IdentityBank::from_json_str(
            r#"{"categories": {"annual_salary": {"values": [32500.0, 75000.5, 150000], "weights": [1, 2, 1]}}}"#,
        )
        .unwrap();
        let values = bank.category("annual_salary").unwrap().values();
        assert_eq!(values[0], AttributeValue::Float(32500.0));
        assert_eq!(values[1], AttributeValue::Float(75000.5));
        assert_eq!(values[2], AttributeValue::Int(150_000));
    }

    #[test]
    fn test_serialize_round_trips_through_loader() {
        let bank = IdentityBank::builder()
            .category("health_status", [(true, 0.3), (false, 0.7)])
            .category("illness", [("flu", 2.0), ("asthma", 1.0)])
            .conditional("illness", "health_status", true)
            .build()
            .unwrap();

        let json = serde_json::to_string(&bank).unwrap();
        let reloaded = IdentityBank::from_json_str(&json).unwrap();
        assert_eq!(reloaded.categories(), bank.categories());
        assert_eq!(reloaded.rule("illness"), bank.rule("illness"));
    }
}
