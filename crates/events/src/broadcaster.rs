//! Best-effort delivery of progress events to the subscriber of a job.
//!
//! Each job has at most one subscriber; a new subscription for the same job
//! replaces the old one, whose receiver then observes the channel closing.
//! Events for a job with no subscriber are dropped. A publish waits at most
//! the configured send timeout; when delivery fails the subscription is torn
//! down and the failure is logged, never surfaced to the publisher.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use upscaler_core::types::{JobId, Timestamp};

use crate::event::ProgressEvent;

/// Default per-subscriber buffer of undelivered events.
pub const DEFAULT_BUFFER: usize = 64;

/// Default bound on a single send attempt.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(250);

/// Identifies one subscription, so a stale holder cannot tear down the
/// subscription that replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Subscriber {
    id: SubscriptionId,
    sender: mpsc::Sender<ProgressEvent>,
    subscribed_at: Timestamp,
}

/// Receiving half handed to the subscriber (typically a WebSocket task).
#[derive(Debug)]
pub struct ProgressSubscription {
    id: SubscriptionId,
    job_id: JobId,
    receiver: mpsc::Receiver<ProgressEvent>,
}

impl ProgressSubscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Next event, or `None` once the subscription has been torn down,
    /// replaced, or the broadcaster shut down.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }
}

/// Job-addressed progress fan-out.
///
/// Thread-safe via interior `RwLock`; wrap in `Arc` and share.
pub struct ProgressBroadcaster {
    subscribers: RwLock<HashMap<JobId, Subscriber>>,
    next_id: AtomicU64,
    buffer: usize,
    send_timeout: Duration,
}

impl ProgressBroadcaster {
    pub fn new(send_timeout: Duration) -> Self {
        Self::with_buffer(send_timeout, DEFAULT_BUFFER)
    }

    pub fn with_buffer(send_timeout: Duration, buffer: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
            send_timeout,
        }
    }

    /// Subscribe to `job_id`, replacing any existing subscriber.
    pub async fn subscribe(&self, job_id: JobId) -> ProgressSubscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscriber = Subscriber {
            id,
            sender,
            subscribed_at: chrono::Utc::now(),
        };

        let replaced = self
            .subscribers
            .write()
            .await
            .insert(job_id.clone(), subscriber);
        if let Some(old) = replaced {
            tracing::debug!(
                job_id = %job_id,
                old = %old.id,
                new = %id,
                since = %old.subscribed_at,
                "Replacing progress subscriber",
            );
        }

        ProgressSubscription {
            id,
            job_id,
            receiver,
        }
    }

    /// Deliver `event` to its job's subscriber, if any.
    ///
    /// Returns `true` when the event was handed to a subscriber.
    pub async fn publish(&self, event: ProgressEvent) -> bool {
        let target = {
            let subscribers = self.subscribers.read().await;
            subscribers
                .get(&event.job_id)
                .map(|s| (s.id, s.sender.clone()))
        };
        let Some((id, sender)) = target else {
            tracing::trace!(job_id = %event.job_id, "No progress subscriber, event dropped");
            return false;
        };

        let job_id = event.job_id.clone();
        match sender.send_timeout(event, self.send_timeout).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    subscription = %id,
                    error = %e,
                    "Progress delivery failed, dropping subscriber",
                );
                self.unsubscribe_if(&job_id, id).await;
                false
            }
        }
    }

    /// Remove the subscriber of `job_id`. Its receiver sees the channel close.
    pub async fn unsubscribe(&self, job_id: &JobId) -> bool {
        self.subscribers.write().await.remove(job_id).is_some()
    }

    /// Remove the subscriber of `job_id` only if it is still `id`.
    pub async fn unsubscribe_if(&self, job_id: &JobId, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().await;
        if subscribers.get(job_id).is_some_and(|s| s.id == id) {
            subscribers.remove(job_id);
            true
        } else {
            false
        }
    }

    pub async fn is_subscribed(&self, job_id: &JobId) -> bool {
        self.subscribers.read().await.contains_key(job_id)
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Drop every subscription. Used during graceful shutdown.
    pub async fn shutdown_all(&self) {
        let mut subscribers = self.subscribers.write().await;
        let count = subscribers.len();
        subscribers.clear();
        tracing::info!(count, "Closed all progress subscriptions");
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_TIMEOUT)
    }
}
