//! HTTP surface.
//!
//! Routes:
//! - `GET /` - Service info
//! - `GET /health` - Health check
//! - `GET /providers` - Providers and platforms
//! - `GET /identities` - Active identity bank
//! - `POST /identities/reload` - Reload the bank file
//! - `POST /predict-ctr` - One CTR estimate (`?include_details=true` for per-identity rows)
//! - `POST /predict-ctr-batch` - Up to ten estimates

mod dto;
mod error;
mod handlers;
mod state;

pub use dto::{CtrRequest, CtrResponse};
pub use error::ApiError;
pub use state::AppState;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/providers", get(handlers::providers))
        .route("/identities", get(handlers::identities))
        .route("/identities/reload", post(handlers::reload_identities))
        .route("/predict-ctr", post(handlers::predict_ctr))
        .route("/predict-ctr-batch", post(handlers::predict_ctr_batch))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
