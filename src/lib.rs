//! CTR Studio: click-through-rate estimation over synthetic populations.
//!
//! A request samples a population from the identity bank, asks a
//! [`engine::ClickPredictor`] for one click label per identity in batches, and
//! aggregates the labels into a CTR.

pub mod api;
pub mod config;
pub mod engine;

pub use config::StudioConfig;
