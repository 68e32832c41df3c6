use std::sync::Arc;

use upscaler_pipeline::JobRunner;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Owns the job registry, engine cache and progress broadcaster.
    pub runner: Arc<JobRunner>,
}
