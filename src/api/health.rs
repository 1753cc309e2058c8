use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState, ModelSlot};

pub const WELCOME_MESSAGE: &str = "Welcome to the Energy Load Prediction API!";

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// GET / - static greeting
pub async fn home() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: WELCOME_MESSAGE.to_string(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub model: ModelHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelHealth {
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /healthz - always 200; reports whether predictions can be served
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (status, model) = match state.model.as_ref() {
        ModelSlot::Ready(predictor) => (
            "healthy",
            ModelHealth {
                loaded: true,
                kind: Some(predictor.model_kind().to_string()),
                features: Some(predictor.feature_names().len()),
                error: None,
            },
        ),
        ModelSlot::Unavailable(reason) => (
            "degraded",
            ModelHealth {
                loaded: false,
                kind: None,
                features: None,
                error: Some(reason.clone()),
            },
        ),
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: status.to_string(),
            timestamp: chrono::Utc::now(),
            model,
        }),
    )
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("no such route".to_string())
}
