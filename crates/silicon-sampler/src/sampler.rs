//! Deterministic population sampling.
//!
//! One `ChaCha8Rng` seeded from the request seed drives the whole population.
//! Each identity consumes one uniform draw per attribute it ends up with, in
//! attribute order, so the same `(bank, n, seed)` always yields the same
//! population on every platform.

use std::sync::Arc;

use ctr_types::{AttributeValue, Identity, ValidationError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Serialize, Serializer};

use crate::bank::IdentityBank;

/// An ordered, immutable population. Cheap to clone and share across tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    seed: u64,
    identities: Arc<[Identity]>,
}

impl Population {
    pub fn new(seed: u64, identities: Vec<Identity>) -> Self {
        Self {
            seed,
            identities: identities.into(),
        }
    }

    /// Seed the population was drawn with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    /// Shared handle used by batch workers.
    pub fn shared(&self) -> Arc<[Identity]> {
        Arc::clone(&self.identities)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Identity> {
        self.identities.iter()
    }
}

impl Serialize for Population {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.identities.iter())
    }
}

impl<'a> IntoIterator for &'a Population {
    type Item = &'a Identity;
    type IntoIter = std::slice::Iter<'a, Identity>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Draw `n` identities from `bank` with a fixed seed.
pub fn sample(bank: &IdentityBank, n: usize, seed: u64) -> Result<Population, ValidationError> {
    if n == 0 {
        return Err(ValidationError::ZeroPopulationSize);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let identities: Vec<Identity> = (0..n).map(|_| sample_identity(bank, &mut rng)).collect();

    tracing::debug!(n, seed, attributes = bank.len(), "population sampled");
    Ok(Population::new(seed, identities))
}

/// Draw one identity using the caller's generator.
///
/// Unconditional categories are visited in bank order; after each draw the
/// categories it triggers are drawn immediately, recursively.
pub fn sample_identity<R: Rng + ?Sized>(bank: &IdentityBank, rng: &mut R) -> Identity {
    let mut attributes = Vec::with_capacity(bank.len());
    for &idx in bank.roots() {
        draw(bank, idx, rng, &mut attributes);
    }
    Identity::new(attributes)
}

fn draw<R: Rng + ?Sized>(
    bank: &IdentityBank,
    idx: usize,
    rng: &mut R,
    out: &mut Vec<(String, AttributeValue)>,
) {
    let category = bank.category_at(idx);
    let u: f64 = rng.r#gen();
    let value = category.pick(u).clone();

    let triggered: Vec<usize> = bank
        .dependents_of(idx)
        .iter()
        .copied()
        .filter(|&dep| bank.trigger_at(dep) == Some(&value))
        .collect();

    out.push((category.name().to_string(), value));
    for dep in triggered {
        draw(bank, dep, rng, out);
    }
}
