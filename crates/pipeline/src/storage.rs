//! Result artifact persistence.
//!
//! The pipeline only needs `save -> handle` and `load(handle) -> bytes`;
//! [`LocalArtifactStore`] keeps each job's artifacts in its own directory
//! so cleanup can drop them all at once.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use upscaler_core::types::JobId;

use crate::error::StorageError;

/// Opaque reference to a saved result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactHandle {
    pub job_id: JobId,
    pub filename: String,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist `bytes` as `filename` for `job_id`, replacing any previous
    /// artifact of the same name.
    async fn save(
        &self,
        job_id: &JobId,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<ArtifactHandle, StorageError>;

    /// Read a saved artifact. Missing artifacts fail with `NotFound`.
    async fn load(&self, handle: &ArtifactHandle) -> Result<Vec<u8>, StorageError>;

    /// Delete every artifact of `job_id`. Deleting nothing is not an error.
    async fn delete_job(&self, job_id: &JobId) -> Result<(), StorageError>;
}

/// Reject names that would escape the job directory.
pub fn validate_artifact_name(filename: &str) -> Result<(), StorageError> {
    let is_plain = Path::new(filename)
        .file_name()
        .is_some_and(|name| name == filename);
    if filename.is_empty() || !is_plain || filename.contains(['/', '\\']) {
        return Err(StorageError::InvalidName(filename.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Local filesystem
// ---------------------------------------------------------------------------

/// Stores artifacts at `{root}/{job_id}/{filename}`.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.root.join(job_id.as_str())
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn save(
        &self,
        job_id: &JobId,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<ArtifactHandle, StorageError> {
        validate_artifact_name(filename)?;
        let dir = self.job_dir(job_id);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(filename);
        tokio::fs::write(&path, &bytes).await?;
        tracing::debug!(job_id = %job_id, path = %path.display(), size = bytes.len(), "Artifact saved");

        Ok(ArtifactHandle {
            job_id: job_id.clone(),
            filename: filename.to_string(),
        })
    }

    async fn load(&self, handle: &ArtifactHandle) -> Result<Vec<u8>, StorageError> {
        validate_artifact_name(&handle.filename)?;
        let path = self.job_dir(&handle.job_id).join(&handle.filename);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(
                format!("{}/{}", handle.job_id, handle.filename),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_job(&self, job_id: &JobId) -> Result<(), StorageError> {
        match tokio::fs::remove_dir_all(self.job_dir(job_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
