//! Synthetic identity sampling.
//!
//! # Design Principles
//!
//! 1. **Validated up front**: an [`IdentityBank`] cannot exist in an invalid
//!    state, so sampling itself never fails on bank content.
//! 2. **Deterministic**: a seed fully determines the population.
//! 3. **Ordered**: attribute order follows the bank file, conditional fields
//!    right after the field that triggered them.

pub mod bank;
pub mod sampler;
pub mod store;

pub use bank::{Category, ConditionalRule, IdentityBank, IdentityBankBuilder};
pub use sampler::{Population, sample, sample_identity};
pub use store::IdentityBankStore;
