//! Per-job progress WebSocket.
//!
//! A client connects to `/ws/{job_id}` and becomes that job's single
//! progress subscriber. Events are forwarded as JSON text frames, and the
//! socket is closed once the broadcaster drops the subscription.

mod handler;

pub use handler::{ws_handler, HEARTBEAT_INTERVAL};
