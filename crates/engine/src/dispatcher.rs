//! Channel-aware dispatch of a single magnification stage.
//!
//! Engines only understand 3-channel rasters. Transparent input is split,
//! the alpha plane is replicated to three channels and magnified with the
//! same engine, then the two results are merged back.
//!
//! Progress for a 4-channel input is allotted as:
//!
//! | fraction | event                          |
//! |----------|--------------------------------|
//! | 0.10     | channels split, RGB pass start |
//! | 0.10-0.80| RGB pass (engine progress)     |
//! | 0.80     | alpha pass start (no progress) |
//! | 0.95     | combining channels             |
//! | 1.00     | complete                       |

use upscaler_core::progress::{ProgressRange, ProgressSink, ScaledProgress};
use upscaler_core::raster::{ChannelLayout, RasterImage};

use crate::engine::UpscaleEngine;
use crate::error::EngineError;

pub const PROGRESS_SPLIT: f64 = 0.1;
pub const PROGRESS_RGB_DONE: f64 = 0.8;
pub const PROGRESS_COMBINE: f64 = 0.95;
pub const PROGRESS_DONE: f64 = 1.0;

pub const MESSAGE_RGB: &str = "Processing RGB channels...";
pub const MESSAGE_ALPHA: &str = "Processing alpha channel...";
pub const MESSAGE_COMBINE: &str = "Combining channels...";
pub const MESSAGE_DONE: &str = "Complete!";

/// Magnify `image` with `engine`, preserving transparency if present.
///
/// Progress is reported as local fractions in `[0, 1]`.
pub fn apply(
    engine: &dyn UpscaleEngine,
    image: &RasterImage,
    progress: &dyn ProgressSink,
) -> Result<RasterImage, EngineError> {
    let Some((rgb, alpha)) = image.split_alpha() else {
        return engine.predict_with_progress(image, progress);
    };

    progress.report(PROGRESS_SPLIT, MESSAGE_RGB);
    let rgb_progress =
        ScaledProgress::new(progress, ProgressRange::new(PROGRESS_SPLIT, PROGRESS_RGB_DONE));
    let rgb_out = engine.predict_with_progress(&rgb, &rgb_progress)?;

    progress.report(PROGRESS_RGB_DONE, MESSAGE_ALPHA);
    let alpha_rgb = RasterImage::replicate_plane(image.width(), image.height(), &alpha)?;
    let alpha_out = engine.predict(&alpha_rgb)?;

    progress.report(PROGRESS_COMBINE, MESSAGE_COMBINE);
    let merged = RasterImage::merge_alpha(&rgb_out, &alpha_out)?;
    debug_assert_eq!(merged.layout(), ChannelLayout::Rgba);

    progress.report(PROGRESS_DONE, MESSAGE_DONE);
    Ok(merged)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
