use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::dto::{ErrorBody, timestamp};
use crate::engine::EngineError;

/// API-layer error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 400 - Bad request (invalid input)
    #[error("{0}")]
    BadRequest(String),

    /// 500 - Internal error
    #[error("{0}")]
    Internal(String),

    /// 503 - Identity bank unavailable
    #[error("{0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(_) => "internal_error",
            ApiError::Unavailable(_) => "unavailable",
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            error: self.kind().into(),
            message: self.to_string(),
            timestamp: timestamp(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, ApiError::Internal(_)) {
            tracing::error!(error = %self, "request failed");
        }
        (self.status(), Json(self.to_body())).into_response()
    }
}

// Config and validation problems are the caller's to fix
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Config(e) => ApiError::BadRequest(e.to_string()),
            EngineError::Validation(e) => ApiError::BadRequest(e.to_string()),
            EngineError::Export { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ctr_types::ConfigError> for ApiError {
    fn from(err: ctr_types::ConfigError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctr_types::ValidationError;

    #[test]
    fn test_engine_error_mapping() {
        let err: ApiError = EngineError::Validation(ValidationError::EmptyAdText).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "ad text cannot be empty");

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ApiError = EngineError::Export {
            path: "/x".into(),
            source: io,
        }
        .into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_body() {
        let body = ApiError::Unavailable("bank missing".into()).to_body();
        assert!(!body.success);
        assert_eq!(body.error, "unavailable");
        assert_eq!(body.message, "bank missing");
    }
}
