//! In-memory job registry and the job status state machine.
//!
//! ```text
//! accepted ──► processing ──► completed
//!     │             │
//!     └─────────────┴───────► error
//! ```
//!
//! Terminal states are final. Only the worker executing a job mutates its
//! record; status, download and cleanup requests read or remove it.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::RwLock;
use upscaler_core::error::CoreError;
use upscaler_core::types::{JobId, ResampleMode, Scale, Timestamp};

use crate::storage::ArtifactHandle;

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Accepted,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Accepted, Processing) | (Accepted, Error) | (Processing, Completed) | (Processing, Error)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobRecord
// ---------------------------------------------------------------------------

/// Snapshot of one job's metadata.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Non-decreasing while the job runs; exactly 1.0 once completed.
    pub progress: f64,
    pub message: String,
    /// Name of the uploaded file.
    pub original_filename: String,
    pub scales: Vec<Scale>,
    pub resample_mode: ResampleMode,
    /// Serialized as `filename`: the result's name, empty until completed.
    #[serde(rename = "filename", serialize_with = "serialize_result_filename")]
    pub result: Option<ArtifactHandle>,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl JobRecord {
    pub fn new(
        job_id: JobId,
        original_filename: String,
        scales: Vec<Scale>,
        mode: ResampleMode,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            job_id,
            status: JobStatus::Accepted,
            progress: 0.0,
            message: "Job accepted".to_string(),
            original_filename,
            scales,
            resample_mode: mode,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Filename of the result artifact, once completed.
    pub fn result_filename(&self) -> Option<&str> {
        self.result.as_ref().map(|r| r.filename.as_str())
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "Job {} cannot move from {} to {next}",
                self.job_id, self.status
            )));
        }
        self.status = next;
        self.updated_at = chrono::Utc::now();
        Ok(())
    }
}

fn serialize_result_filename<S: serde::Serializer>(
    result: &Option<ArtifactHandle>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(result.as_ref().map_or("", |r| r.filename.as_str()))
}

// ---------------------------------------------------------------------------
// JobRegistry
// ---------------------------------------------------------------------------

/// Thread-safe job store, addressed by [`JobId`].
///
/// Every mutation of a job that no longer exists fails with `NotFound`;
/// a removed job is never recreated.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job. Fails with `Conflict` if the id is taken.
    pub async fn insert(&self, record: JobRecord) -> Result<(), CoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&record.job_id) {
            return Err(CoreError::Conflict(format!(
                "Job {} already exists",
                record.job_id
            )));
        }
        jobs.insert(record.job_id.clone(), record);
        Ok(())
    }

    pub async fn get(&self, job_id: &JobId) -> Result<JobRecord, CoreError> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| CoreError::job_not_found(job_id.as_str()))
    }

    pub async fn contains(&self, job_id: &JobId) -> bool {
        self.jobs.read().await.contains_key(job_id)
    }

    pub async fn mark_processing(&self, job_id: &JobId, message: &str) -> Result<(), CoreError> {
        self.update(job_id, |record| {
            record.transition(JobStatus::Processing)?;
            record.message = message.to_string();
            Ok(())
        })
        .await
    }

    /// Record progress for a processing job and return the stored value.
    ///
    /// The stored progress never decreases: a lower `progress` keeps the
    /// previous value but still updates the message.
    pub async fn update_progress(
        &self,
        job_id: &JobId,
        progress: f64,
        message: &str,
    ) -> Result<f64, CoreError> {
        self.update(job_id, |record| {
            if record.status != JobStatus::Processing {
                return Err(CoreError::Conflict(format!(
                    "Job {} is {}, not processing",
                    record.job_id, record.status
                )));
            }
            let progress = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 1.0) };
            record.progress = record.progress.max(progress);
            record.message = message.to_string();
            record.updated_at = chrono::Utc::now();
            Ok(record.progress)
        })
        .await
    }

    pub async fn complete(
        &self,
        job_id: &JobId,
        artifact: ArtifactHandle,
        message: &str,
    ) -> Result<(), CoreError> {
        self.update(job_id, |record| {
            record.transition(JobStatus::Completed)?;
            record.progress = 1.0;
            record.message = message.to_string();
            record.result = Some(artifact);
            Ok(())
        })
        .await
    }

    pub async fn fail(&self, job_id: &JobId, error: &str) -> Result<(), CoreError> {
        self.update(job_id, |record| {
            record.transition(JobStatus::Error)?;
            record.message = format!("Error: {error}");
            record.error = Some(error.to_string());
            Ok(())
        })
        .await
    }

    /// Remove a job, returning its final record.
    pub async fn remove(&self, job_id: &JobId) -> Option<JobRecord> {
        self.jobs.write().await.remove(job_id)
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Number of jobs not yet in a terminal state.
    pub async fn active_count(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|r| !r.status.is_terminal())
            .count()
    }

    async fn update<T>(
        &self,
        job_id: &JobId,
        f: impl FnOnce(&mut JobRecord) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let mut jobs = self.jobs.write().await;
        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| CoreError::job_not_found(job_id.as_str()))?;
        f(record)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
