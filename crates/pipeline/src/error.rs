use upscaler_core::error::CoreError;
use upscaler_engine::EngineError;

/// Failures of artifact persistence.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Invalid artifact name: {0}")]
    InvalidName(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => CoreError::NotFound {
                entity: "Artifact",
                id,
            },
            StorageError::InvalidName(name) => CoreError::Validation(name),
            StorageError::Io(e) => CoreError::Internal(e.to_string()),
        }
    }
}

/// Anything that can end a job in the `error` state.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A blocking worker task panicked or was cancelled.
    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Worker(err.to_string())
    }
}
