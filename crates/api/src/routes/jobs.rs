use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Upscale job routes.
///
/// ```text
/// POST   /upscale             -> upscale
/// GET    /job/{job_id}        -> get_job
/// DELETE /job/{job_id}        -> delete_job
/// GET    /download/{job_id}   -> download
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upscale", post(jobs::upscale))
        .route("/job/{job_id}", get(jobs::get_job).delete(jobs::delete_job))
        .route("/download/{job_id}", get(jobs::download))
}
