//! Transform engine capability and the device-bound handle wrapping it.

use std::fmt;
use std::time::Duration;

use upscaler_core::progress::ProgressSink;
use upscaler_core::raster::RasterImage;
use upscaler_core::types::{Device, ResampleMode, Scale};

use crate::error::EngineError;

/// A magnification engine bound to one scale factor and one device.
///
/// Engines only accept 3-channel input; transparency is handled by
/// [`crate::dispatcher::apply`]. Calls happen on blocking worker threads.
pub trait UpscaleEngine: Send + Sync {
    /// Magnify without reporting progress.
    fn predict(&self, image: &RasterImage) -> Result<RasterImage, EngineError>;

    /// Magnify, reporting local progress in `[0, 1]` zero or more times.
    fn predict_with_progress(
        &self,
        image: &RasterImage,
        progress: &dyn ProgressSink,
    ) -> Result<RasterImage, EngineError>;

    fn resample_mode(&self) -> ResampleMode;

    /// Switch the resampling mode in place, without reloading weights.
    fn set_resample_mode(&self, mode: ResampleMode);
}

/// Constructs engines. Construction may take seconds (weight loading,
/// device initialisation) and is always run off the async runtime.
pub trait EngineLoader: Send + Sync + 'static {
    fn load(&self, scale: Scale, device: Device) -> Result<Box<dyn UpscaleEngine>, EngineError>;
}

/// Cache key: one engine per `(scale, resampling mode)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineKey {
    pub scale: Scale,
    pub mode: ResampleMode,
}

impl EngineKey {
    pub fn new(scale: Scale, mode: ResampleMode) -> Self {
        Self { scale, mode }
    }
}

impl fmt::Display for EngineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}/{}", self.scale.factor(), self.mode)
    }
}

/// A loaded, device-bound engine registered in the [`crate::EngineCache`].
pub struct EngineHandle {
    key: EngineKey,
    device: Device,
    load_time: Duration,
    engine: Box<dyn UpscaleEngine>,
}

impl EngineHandle {
    pub fn new(
        key: EngineKey,
        device: Device,
        load_time: Duration,
        engine: Box<dyn UpscaleEngine>,
    ) -> Self {
        Self {
            key,
            device,
            load_time,
            engine,
        }
    }

    pub fn key(&self) -> EngineKey {
        self.key
    }

    pub fn scale(&self) -> Scale {
        self.key.scale
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// How long construction took.
    pub fn load_time(&self) -> Duration {
        self.load_time
    }

    pub fn engine(&self) -> &dyn UpscaleEngine {
        self.engine.as_ref()
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("key", &self.key)
            .field("device", &self.device)
            .field("resample_mode", &self.engine.resample_mode())
            .finish()
    }
}
