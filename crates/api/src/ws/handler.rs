use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use upscaler_core::types::JobId;
use upscaler_events::ProgressSubscription;

use crate::error::AppResult;
use crate::handlers::jobs::lookup_id;
use crate::state::AppState;

/// Interval between heartbeat pings.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// GET /ws/{job_id}
///
/// The job does not need to exist yet: clients may connect with their own
/// id before submitting the upload.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(job_id): Path<String>,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let job_id = lookup_id(&job_id)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, job_id, state)))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Subscribes to the job's progress.
///   2. Spawns a sender task that forwards events and heartbeats.
///   3. Processes inbound messages on the current task.
///   4. Releases the subscription on disconnect, unless a newer
///      connection has already replaced it.
async fn handle_socket(socket: WebSocket, job_id: JobId, state: AppState) {
    let broadcaster = state.runner.broadcaster().clone();
    let subscription = broadcaster.subscribe(job_id.clone()).await;
    let sub_id = subscription.id();
    tracing::info!(job_id = %job_id, sub_id = %sub_id, "WebSocket connected");

    let (sink, mut stream) = socket.split();
    let mut send_task = tokio::spawn(forward_events(subscription, sink));

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Pong(_))) => {
                    tracing::trace!(job_id = %job_id, "Pong received");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(job_id = %job_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
        }
    }

    send_task.abort();
    broadcaster.unsubscribe_if(&job_id, sub_id).await;
    tracing::info!(job_id = %job_id, sub_id = %sub_id, "WebSocket disconnected");
}

/// Forward progress events and periodic pings until the subscription ends
/// or the client goes away.
async fn forward_events(
    mut subscription: ProgressSubscription,
    mut sink: SplitSink<WebSocket, Message>,
) {
    let start = tokio::time::Instant::now() + HEARTBEAT_INTERVAL;
    let mut heartbeat = tokio::time::interval_at(start, HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let text = match event.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(job_id = %event.job_id, error = %e, "Failed to serialize progress event");
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    tracing::debug!(job_id = %subscription.job_id(), "WebSocket sink closed");
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}
