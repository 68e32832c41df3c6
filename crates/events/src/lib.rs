//! Per-job progress events and their best-effort delivery to subscribers.

pub mod broadcaster;
pub mod event;

pub use broadcaster::{ProgressBroadcaster, ProgressSubscription, SubscriptionId};
pub use event::{ProgressEvent, ProgressEventKind};
