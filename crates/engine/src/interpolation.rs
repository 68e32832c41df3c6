//! Built-in CPU engine that magnifies by classical resampling.
//!
//! Stands in for a learned super-resolution model: same contract, same
//! weight-file check at load time, but the transform itself is a filtered
//! resize performed in floating point.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use image::imageops::{self, FilterType};
use upscaler_core::progress::{NoProgress, ProgressSink};
use upscaler_core::raster::{ChannelLayout, RasterImage};
use upscaler_core::types::{Device, DevicePreference, ResampleMode, Scale};
use upscaler_core::validation::DEFAULT_MAX_OUTPUT_PIXELS;

use crate::engine::{EngineLoader, UpscaleEngine};
use crate::error::EngineError;

const MESSAGE_START: &str = "Upscaling...";
const MESSAGE_PREPARED: &str = "Resampling...";
const MESSAGE_DONE: &str = "Upscale complete";

fn filter_for(mode: ResampleMode) -> FilterType {
    match mode {
        ResampleMode::Nearest | ResampleMode::NearestExact | ResampleMode::Area => {
            FilterType::Nearest
        }
        ResampleMode::Linear | ResampleMode::Bilinear => FilterType::Triangle,
        ResampleMode::Bicubic => FilterType::CatmullRom,
    }
}

/// Resampling engine bound to one scale factor.
#[derive(Debug)]
pub struct InterpolationEngine {
    scale: Scale,
    device: Device,
    mode: RwLock<ResampleMode>,
    /// Largest output, in pixels, this engine will allocate.
    max_output_pixels: u64,
}

impl InterpolationEngine {
    pub fn new(scale: Scale, device: Device) -> Self {
        Self {
            scale,
            device,
            mode: RwLock::new(ResampleMode::default()),
            max_output_pixels: DEFAULT_MAX_OUTPUT_PIXELS,
        }
    }

    pub fn with_max_output_pixels(mut self, max_output_pixels: u64) -> Self {
        self.max_output_pixels = max_output_pixels;
        self
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn device(&self) -> Device {
        self.device
    }

    fn target_dimensions(&self, image: &RasterImage) -> Result<(u32, u32), EngineError> {
        let factor = self.scale.factor();
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(EngineError::Transform("Input image is empty".into()));
        }
        let too_large =
            || EngineError::Transform(format!("{width}x{height} is too large to magnify by x{factor}"));
        let (w, h) = width
            .checked_mul(factor)
            .zip(height.checked_mul(factor))
            .ok_or_else(too_large)?;
        if u64::from(w) * u64::from(h) > self.max_output_pixels {
            return Err(too_large());
        }
        Ok((w, h))
    }
}

impl UpscaleEngine for InterpolationEngine {
    fn predict(&self, image: &RasterImage) -> Result<RasterImage, EngineError> {
        self.predict_with_progress(image, &NoProgress)
    }

    fn predict_with_progress(
        &self,
        image: &RasterImage,
        progress: &dyn ProgressSink,
    ) -> Result<RasterImage, EngineError> {
        if image.layout() != ChannelLayout::Rgb {
            return Err(EngineError::UnsupportedChannels(image.channels()));
        }
        progress.report(0.0, MESSAGE_START);

        let (width, height) = self.target_dimensions(image)?;
        let filter = filter_for(self.resample_mode());
        let input = image.to_dynamic()?.into_rgb32f();
        progress.report(0.1, MESSAGE_PREPARED);

        let resized = imageops::resize(&input, width, height, filter);
        let samples: Vec<f32> = resized.into_raw().into_iter().map(|v| v * 255.0).collect();
        let output = RasterImage::from_f32_samples(width, height, ChannelLayout::Rgb, &samples)?;

        progress.report(1.0, MESSAGE_DONE);
        Ok(output)
    }

    fn resample_mode(&self) -> ResampleMode {
        *self.mode.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_resample_mode(&self, mode: ResampleMode) {
        *self.mode.write().unwrap_or_else(PoisonError::into_inner) = mode;
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Loads [`InterpolationEngine`]s, checking for a weight file per scale
/// when a weights directory is configured.
#[derive(Debug, Clone, Default)]
pub struct InterpolationLoader {
    weights_dir: Option<PathBuf>,
    max_output_pixels: Option<u64>,
}

impl InterpolationLoader {
    pub fn new(weights_dir: Option<PathBuf>) -> Self {
        Self {
            weights_dir,
            max_output_pixels: None,
        }
    }

    /// Bound applied to every engine this loader constructs.
    pub fn with_max_output_pixels(mut self, max_output_pixels: u64) -> Self {
        self.max_output_pixels = Some(max_output_pixels);
        self
    }

    /// Expected weight file for `scale`, if a weights directory is set.
    pub fn weights_path(&self, scale: Scale) -> Option<PathBuf> {
        self.weights_dir
            .as_deref()
            .map(|dir| dir.join(format!("RealESRGAN_x{}.pth", scale.factor())))
    }

    /// Resolve a configured device preference to a device this engine can
    /// run on. Only the CPU is supported.
    pub fn resolve_device(preference: DevicePreference) -> Result<Device, EngineError> {
        match preference {
            DevicePreference::Auto | DevicePreference::Exact(Device::Cpu) => Ok(Device::Cpu),
            DevicePreference::Exact(device) => Err(EngineError::Device(format!(
                "{device} is not supported by the interpolation engine"
            ))),
        }
    }

    fn verify_weights(path: &Path, scale: Scale) -> Result<(), EngineError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => Ok(()),
            Ok(_) => Err(EngineError::Load(format!("{} is not a file", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EngineError::WeightsNotFound {
                scale,
                path: path.to_path_buf(),
            }),
            Err(e) => Err(EngineError::Load(format!("{}: {e}", path.display()))),
        }
    }
}

impl EngineLoader for InterpolationLoader {
    fn load(&self, scale: Scale, device: Device) -> Result<Box<dyn UpscaleEngine>, EngineError> {
        if device != Device::Cpu {
            return Err(EngineError::Device(format!(
                "{device} is not supported by the interpolation engine"
            )));
        }
        if let Some(path) = self.weights_path(scale) {
            Self::verify_weights(&path, scale)?;
            tracing::debug!(scale = %scale, path = %path.display(), "Weight file verified");
        }
        let engine = InterpolationEngine::new(scale, device);
        Ok(Box::new(match self.max_output_pixels {
            Some(max) => engine.with_max_output_pixels(max),
            None => engine,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
