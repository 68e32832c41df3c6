//! Transform engines, the shared engine cache, and channel-aware dispatch.

pub mod cache;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod interpolation;

pub use cache::EngineCache;
pub use engine::{EngineHandle, EngineKey, EngineLoader, UpscaleEngine};
pub use error::EngineError;
pub use interpolation::{InterpolationEngine, InterpolationLoader};
