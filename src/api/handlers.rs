use axum::{
    Json,
    extract::{Query, State},
};
use serde_json::{Value, json};
use std::sync::Arc;

use super::dto::*;
use super::error::ApiError;
use super::state::AppState;
use crate::engine::run_prediction;
use ctr_types::{Platform, ValidationError};
use silicon_sampler::IdentityBank;

/// GET / - Service info
pub async fn root() -> Json<Value> {
    Json(json!({
        "name": "CTR Studio API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Click-through-rate prediction using synthetic identities and LLM click predictors",
        "endpoints": {
            "health": "/health",
            "providers": "/providers",
            "identities": "/identities",
            "reload_identities": "/identities/reload",
            "predict": "/predict-ctr",
            "batch_predict": "/predict-ctr-batch",
        }
    }))
}

/// GET /health - Health check
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: timestamp(),
        available_providers: state.registry.names().into_iter().map(String::from).collect(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /providers - Registered providers and supported platforms
pub async fn providers(State(state): State<Arc<AppState>>) -> Json<Value> {
    let providers: serde_json::Map<String, Value> = state
        .registry
        .providers()
        .map(|info| {
            (
                info.name.clone(),
                json!({
                    "default_model": info.default_model,
                    "description": info.description,
                    "env_var": info.env_var,
                }),
            )
        })
        .collect();
    let platforms: Vec<&str> = Platform::ALL.iter().map(Platform::as_str).collect();

    Json(json!({
        "available_providers": providers,
        "platforms": platforms,
    }))
}

/// GET /identities - The active identity bank
pub async fn identities(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let bank = state.bank()?;
    let body = IdentitiesResponse {
        path: state.store.path().display().to_string(),
        categories: bank.len(),
        bank: &bank,
    };
    serde_json::to_value(&body)
        .map(Json)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// POST /identities/reload - Re-read the bank file
pub async fn reload_identities(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReloadResponse>, ApiError> {
    let bank = state
        .store
        .reload()
        .map_err(|e| ApiError::Unavailable(format!("identity bank reload failed: {}", e)))?;

    Ok(Json(ReloadResponse {
        success: true,
        path: state.store.path().display().to_string(),
        categories: bank.len(),
        timestamp: timestamp(),
    }))
}

/// POST /predict-ctr - Estimate CTR for one ad
pub async fn predict_ctr(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PredictQuery>,
    Json(req): Json<CtrRequest>,
) -> Result<Json<CtrResponse>, ApiError> {
    predict_one(&state, &req, query.include_details).await.map(Json)
}

/// POST /predict-ctr-batch - Estimate CTR for up to ten ads
pub async fn predict_ctr_batch(
    State(state): State<Arc<AppState>>,
    Json(requests): Json<Vec<CtrRequest>>,
) -> Result<Json<Vec<BatchItem>>, ApiError> {
    if requests.len() > MAX_BATCH_REQUESTS {
        let err = ValidationError::TooManyRequests {
            got: requests.len(),
            max: MAX_BATCH_REQUESTS,
        };
        return Err(ApiError::BadRequest(err.to_string()));
    }

    let mut results = Vec::with_capacity(requests.len());
    for req in &requests {
        let item = match predict_one(&state, req, false).await {
            Ok(response) => BatchItem::Ok(response),
            Err(e) => BatchItem::Err(e.to_body()),
        };
        results.push(item);
    }
    Ok(Json(results))
}

async fn predict_one(
    state: &AppState,
    req: &CtrRequest,
    include_details: bool,
) -> Result<CtrResponse, ApiError> {
    let request = req.to_engine()?;
    let bank = match &req.identity_bank_path {
        Some(path) => Arc::new(IdentityBank::from_path(path)?),
        None => state.bank()?,
    };

    let outcome = run_prediction(&request, &bank, &state.registry, &state.config).await?;

    let details = if include_details {
        Some(
            outcome
                .details()
                .map_err(|e| ApiError::Internal(e.to_string()))?,
        )
    } else {
        None
    };
    Ok(CtrResponse::from_outcome(&outcome, request.platform, details))
}
