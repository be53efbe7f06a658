//! Offline keyword-affinity predictor.
//!
//! Scores how many of the ad's keywords appear in the vocabulary associated
//! with the identity's age bracket, interest and the platform, perturbs the
//! score with per-identity noise and draws a label from a logistic curve.
//! Noise is seeded from `(population seed, identity index)`, so labels do not
//! depend on batching or execution mode.

use std::collections::BTreeSet;

use async_trait::async_trait;
use ctr_types::{AdContext, Identity, Platform, Prediction, PredictionSource, ProviderError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::orchestrator::Batch;
use super::predictor::ClickPredictor;

pub const MOCK_PROVIDER: &str = "mock";
pub const MOCK_MODEL: &str = "mock model (no LLM)";

const MATCH_WEIGHT: f64 = 0.6;
const BASE_AFFINITY: f64 = 0.15;
const NOISE_SCALE: f64 = 0.2;
const LOGISTIC_STEEPNESS: f64 = 8.0;
const LOGISTIC_MIDPOINT: f64 = 0.55;
const INDEX_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

// =============================================================================
// Vocabulary
// =============================================================================

fn age_keywords(bracket: &str) -> &'static [&'static str] {
    match bracket {
        "18-24" => &[
            "game", "gaming", "music", "student", "festival", "sneakers", "app", "streaming",
            "trend", "viral",
        ],
        "25-34" => &[
            "travel", "fitness", "coffee", "career", "apartment", "startup", "subscription",
            "delivery", "dating", "wedding",
        ],
        "35-44" => &[
            "family", "home", "kids", "mortgage", "insurance", "organic", "car", "career",
            "coffee", "vacation",
        ],
        "45-54" => &[
            "retirement", "investment", "home", "health", "garden", "premium", "travel", "wine",
            "car", "insurance",
        ],
        "55-64" => &[
            "retirement", "health", "garden", "cruise", "grandchildren", "investment", "wellness",
            "pharmacy", "classic", "savings",
        ],
        "65+" => &[
            "medicare", "health", "pharmacy", "cruise", "grandchildren", "garden", "savings",
            "comfort", "pension", "hearing",
        ],
        _ => &[],
    }
}

fn interest_keywords(interest: &str) -> &'static [&'static str] {
    match interest {
        "technology" => &[
            "tech", "app", "smart", "software", "laptop", "phone", "gadget", "wireless", "digital",
            "device",
        ],
        "fashion" => &[
            "style", "fashion", "dress", "sneakers", "collection", "designer", "outfit", "wear",
            "trend", "luxury",
        ],
        "food" => &[
            "coffee", "food", "recipe", "organic", "restaurant", "delivery", "snack", "gourmet",
            "premium", "taste",
        ],
        "fitness" => &[
            "fitness", "gym", "workout", "protein", "running", "yoga", "health", "training",
            "energy", "wellness",
        ],
        "travel" => &[
            "travel", "flight", "hotel", "vacation", "trip", "cruise", "adventure", "destination",
            "miles", "rewards",
        ],
        "finance" => &[
            "credit", "card", "apr", "invest", "investment", "savings", "bank", "loan", "rewards",
            "cash",
        ],
        "gaming" => &[
            "game", "gaming", "console", "play", "stream", "esports", "controller", "level",
            "player", "launch",
        ],
        "home" => &[
            "home", "furniture", "kitchen", "garden", "decor", "cleaning", "mattress", "appliance",
            "cozy", "coffee",
        ],
        "beauty" => &[
            "beauty", "skincare", "makeup", "glow", "serum", "fragrance", "hair", "spa", "natural",
            "premium",
        ],
        "parenting" => &[
            "kids", "baby", "family", "school", "toys", "parents", "safe", "diaper", "learning",
            "stroller",
        ],
        _ => &[],
    }
}

fn platform_keywords(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Facebook => &[
            "family", "community", "event", "local", "friends", "offer", "deal", "group", "share",
            "news",
        ],
        Platform::Tiktok => &[
            "viral", "trend", "challenge", "music", "creator", "dance", "new", "fun", "video",
            "drop",
        ],
        Platform::Amazon => &[
            "deal", "delivery", "prime", "buy", "price", "shipping", "offer", "sale", "review",
            "order",
        ],
    }
}

fn platform_multiplier(platform: Platform) -> f64 {
    match platform {
        Platform::Facebook => 1.0,
        Platform::Tiktok => 1.15,
        Platform::Amazon => 0.9,
    }
}

// =============================================================================
// Scoring
// =============================================================================

/// Lowercased alphanumeric tokens of at least three characters.
pub fn keywords(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .map(str::to_string)
        .collect()
}

/// Share of `keywords` found in the identity's vocabulary for `platform`.
fn match_fraction(keywords: &BTreeSet<String>, identity: &Identity, platform: Platform) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }

    let attr = |name: &str| identity.get(name).and_then(|v| v.as_str()).unwrap_or("");
    let age = age_keywords(attr("age"));
    let interest = interest_keywords(attr("interest"));
    let venue = platform_keywords(platform);

    let matched = keywords
        .iter()
        .filter(|k| {
            let k = k.as_str();
            age.contains(&k) || interest.contains(&k) || venue.contains(&k)
        })
        .count();
    matched as f64 / keywords.len() as f64
}

/// Click probability and label for the identity at `index` in a population
/// drawn with `seed`.
pub fn score(
    keywords: &BTreeSet<String>,
    identity: &Identity,
    index: usize,
    seed: u64,
    platform: Platform,
) -> (f64, bool) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed ^ (index as u64 + 1).wrapping_mul(INDEX_MIX));
    let noise: f64 = rng.r#gen();
    let draw: f64 = rng.r#gen();

    let raw = MATCH_WEIGHT * match_fraction(keywords, identity, platform) + BASE_AFFINITY;
    let affinity =
        (raw * platform_multiplier(platform) + NOISE_SCALE * (noise - 0.5)).clamp(0.0, 1.0);
    let p = 1.0 / (1.0 + (-LOGISTIC_STEEPNESS * (affinity - LOGISTIC_MIDPOINT)).exp());

    (p, draw < p)
}

// =============================================================================
// Predictor
// =============================================================================

/// Deterministic heuristic predictor. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockPredictor;

impl MockPredictor {
    pub fn new() -> Self {
        Self
    }

    /// Label every identity in `batch`, tagging predictions with `source`.
    pub fn label_batch(
        &self,
        batch: &Batch,
        ad: &AdContext,
        source: PredictionSource,
    ) -> Vec<Prediction> {
        let keywords = keywords(&ad.text);
        batch
            .indexed()
            .map(|(index, identity)| {
                let (_, clicked) = score(&keywords, identity, index, batch.seed, ad.platform);
                Prediction::new(clicked, source)
            })
            .collect()
    }
}

#[async_trait]
impl ClickPredictor for MockPredictor {
    fn provider(&self) -> &str {
        MOCK_PROVIDER
    }

    fn model(&self) -> &str {
        MOCK_MODEL
    }

    async fn predict(
        &self,
        batch: &Batch,
        ad: &AdContext,
    ) -> Result<Vec<Prediction>, ProviderError> {
        Ok(self.label_batch(batch, ad, PredictionSource::Mock))
    }
}
