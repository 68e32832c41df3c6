use std::collections::BTreeMap;

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use upscaler_core::types::{ResampleMode, Scale};

use crate::state::AppState;

#[derive(Serialize)]
pub struct RootResponse {
    pub message: &'static str,
}

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Jobs accepted or processing.
    pub active_jobs: usize,
    /// Engines constructed and held by the cache.
    pub cached_engines: usize,
}

/// Supported scales and resampling modes.
#[derive(Serialize)]
pub struct ModelsResponse {
    pub factors: Vec<String>,
    pub resample_modes: Vec<&'static str>,
    pub resample_desc: BTreeMap<&'static str, &'static str>,
}

/// GET / -- liveness banner.
async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Image Upscaler API is running",
    })
}

/// GET /health -- returns service health and job/engine counts.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_jobs: state.runner.active_jobs().await,
        cached_engines: state.runner.cache().len().await,
    })
}

/// GET /models
async fn list_models() -> Json<ModelsResponse> {
    Json(ModelsResponse {
        factors: Scale::ALL.iter().map(|s| s.to_string()).collect(),
        resample_modes: ResampleMode::ALL.iter().map(|m| m.as_str()).collect(),
        resample_desc: ResampleMode::ALL
            .iter()
            .map(|m| (m.as_str(), m.description()))
            .collect(),
    })
}

/// Mount service-level routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/models", get(list_models))
}
