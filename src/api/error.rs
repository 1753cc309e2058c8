use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::PipelineError;

/// Errors returned from handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Model not available: {0}")]
    ModelUnavailable(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// JSON body of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::ModelUnavailable(_) | ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::ValidationError(_) => "ValidationError",
            ApiError::ModelUnavailable(_) => "ModelUnavailable",
            ApiError::InternalError(_) => "InternalServerError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        let (message, details) = match &self {
            ApiError::InternalError(_) => {
                tracing::error!(error = %self, "request failed");
                ("An internal error occurred".to_string(), None)
            }
            ApiError::ModelUnavailable(reason) => {
                tracing::error!(reason = %reason, "prediction requested without a model");
                ("Model not available".to_string(), Some(reason.clone()))
            }
            _ => {
                tracing::debug!(error = %self, "client error");
                (self.to_string(), None)
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: error_type.to_string(),
                message,
                details,
            }),
        )
            .into_response()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(errors.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        match error {
            PipelineError::UnknownCategory { .. } => ApiError::BadRequest(error.to_string()),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ApiError::NotFound("x".to_string()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::BadRequest("x".to_string()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::ValidationError("x".to_string()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::ModelUnavailable("x".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_pipeline_error_mapping() {
        let unknown = PipelineError::UnknownCategory {
            column: "is_weekend".to_string(),
            value: "Maybe".to_string(),
        };
        assert!(matches!(ApiError::from(unknown), ApiError::BadRequest(_)));
        assert!(matches!(
            ApiError::from(PipelineError::Model("nan".to_string())),
            ApiError::InternalError(_)
        ));
    }

    #[test]
    fn test_error_display() {
        let error = ApiError::ValidationError("hour: out of range".to_string());
        assert_eq!(error.to_string(), "Validation error: hour: out of range");
    }
}
