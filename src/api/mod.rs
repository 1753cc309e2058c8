//! Prediction HTTP service

pub mod error;
pub mod health;
pub mod predict;

pub use error::{ApiError, ErrorResponse};

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::Config;
use crate::ml::LoadPredictor;

const BODY_LIMIT_BYTES: usize = 64 * 1024;

/// The model a server instance answers with, fixed at startup.
#[derive(Debug)]
pub enum ModelSlot {
    Ready(LoadPredictor),
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub model: Arc<ModelSlot>,
}

impl AppState {
    pub fn ready(predictor: LoadPredictor) -> Self {
        Self {
            model: Arc::new(ModelSlot::Ready(predictor)),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            model: Arc::new(ModelSlot::Unavailable(reason.into())),
        }
    }

    /// Load the configured model. Without `server.require_model` a load
    /// failure yields a server that answers every prediction with 500.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let model_path = cfg.model_path();
        match LoadPredictor::load(&model_path, &cfg.paths.encoders_dir) {
            Ok(predictor) => Ok(Self::ready(predictor)),
            Err(e) if cfg.server.require_model => {
                Err(e).with_context(|| format!("loading model from {}", model_path.display()))
            }
            Err(e) => {
                warn!(error = %e, path = %model_path.display(), "starting without a model");
                Ok(Self::unavailable(e.to_string()))
            }
        }
    }
}

pub fn router(state: AppState, cfg: &Config) -> Router {
    let mut router = Router::new()
        .route("/", get(health::home))
        .route("/healthz", get(health::health_check))
        .route("/predict", post(predict::predict))
        .fallback(health::not_found)
        .with_state(state);

    if cfg.server.enable_cors {
        match cfg.server.cors_origin.parse::<HeaderValue>() {
            Ok(origin) => {
                let cors = CorsLayer::new()
                    .allow_origin(AllowOrigin::exact(origin))
                    .allow_methods([Method::GET, Method::POST])
                    .allow_headers([header::CONTENT_TYPE]);
                router = router.layer(cors);
            }
            Err(e) => warn!(origin = %cfg.server.cors_origin, error = %e, "invalid CORS origin, CORS disabled"),
        }
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(axum::extract::DefaultBodyLimit::max(BODY_LIMIT_BYTES))
                .layer(TimeoutLayer::new(Duration::from_secs(cfg.server.request_timeout_secs))),
        )
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(cfg: Config) -> anyhow::Result<()> {
    let state = AppState::from_config(&cfg)?;
    let app = router(state, &cfg);

    let addr = cfg.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, "prediction service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(crate::telemetry::shutdown_signal())
        .await?;
    info!("prediction service stopped");
    Ok(())
}
