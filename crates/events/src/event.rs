//! Progress event payload sent to a job's subscriber.

use serde::{Deserialize, Serialize};
use upscaler_core::job_events::{MSG_TYPE_JOB_COMPLETED, MSG_TYPE_JOB_FAILED, MSG_TYPE_JOB_PROGRESS};
use upscaler_core::types::JobId;

/// Kind of a [`ProgressEvent`], serialised as the message `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventKind {
    JobProgress,
    JobCompleted,
    JobFailed,
}

impl ProgressEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JobProgress => MSG_TYPE_JOB_PROGRESS,
            Self::JobCompleted => MSG_TYPE_JOB_COMPLETED,
            Self::JobFailed => MSG_TYPE_JOB_FAILED,
        }
    }

    /// Whether no further events follow for the job.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::JobProgress)
    }
}

/// A `(job, progress, message)` update. Transient: never stored.
///
/// Wire format:
///
/// ```json
/// {"type": "job_progress", "job_id": "abc", "progress": 0.5, "message": "Completed scale x2"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: ProgressEventKind,
    pub job_id: JobId,
    pub progress: f64,
    pub message: String,
}

impl ProgressEvent {
    pub fn progress(job_id: JobId, progress: f64, message: impl Into<String>) -> Self {
        Self {
            kind: ProgressEventKind::JobProgress,
            job_id,
            progress,
            message: message.into(),
        }
    }

    pub fn completed(job_id: JobId, message: impl Into<String>) -> Self {
        Self {
            kind: ProgressEventKind::JobCompleted,
            job_id,
            progress: 1.0,
            message: message.into(),
        }
    }

    /// `progress` is the last value reached before the failure.
    pub fn failed(job_id: JobId, progress: f64, error: impl Into<String>) -> Self {
        Self {
            kind: ProgressEventKind::JobFailed,
            job_id,
            progress,
            message: error.into(),
        }
    }

    /// Serialise to the JSON text sent over the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
