use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Per-job progress WebSocket.
pub fn router() -> Router<AppState> {
    Router::new().route("/ws/{job_id}", get(ws::ws_handler))
}
