use std::path::PathBuf;

use upscaler_core::error::CoreError;
use upscaler_core::types::Scale;

/// Failures raised while constructing or running a transform engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Weights for scale x{scale} not found at {}", path.display())]
    WeightsNotFound { scale: Scale, path: PathBuf },

    #[error("Failed to load engine: {0}")]
    Load(String),

    #[error("Device unavailable: {0}")]
    Device(String),

    #[error("Engine expects 3-channel input, got {0} channels")]
    UnsupportedChannels(usize),

    #[error("Transform failed: {0}")]
    Transform(String),
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        Self::Transform(err.to_string())
    }
}
