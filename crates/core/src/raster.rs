//! The single in-memory raster type passed through the pipeline.
//!
//! Images are interleaved 8-bit samples with either three (opaque) or four
//! (with transparency) channels. Conversion to and from encoded bytes
//! happens only at the edges, see [`crate::codec`].

use std::fmt;

use image::{DynamicImage, RgbImage, RgbaImage};
use serde::Serialize;

use crate::error::CoreError;

/// Channel layout of a [`RasterImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    Rgb,
    Rgba,
}

impl ChannelLayout {
    pub fn channels(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba)
    }
}

/// Interleaved 8-bit raster of `width * height * channels` samples.
#[derive(Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    layout: ChannelLayout,
    data: Vec<u8>,
}

impl RasterImage {
    /// Wrap raw interleaved samples, checking the buffer length.
    pub fn new(
        width: u32,
        height: u32,
        layout: ChannelLayout,
        data: Vec<u8>,
    ) -> Result<Self, CoreError> {
        let expected = sample_count(width, height, layout);
        if data.len() != expected {
            return Err(CoreError::Validation(format!(
                "Raster buffer has {} samples, expected {expected} for {width}x{height} {layout:?}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            layout,
            data,
        })
    }

    /// An image where every pixel has the same value.
    ///
    /// `pixel` must hold exactly `layout.channels()` samples.
    pub fn filled(
        width: u32,
        height: u32,
        layout: ChannelLayout,
        pixel: &[u8],
    ) -> Result<Self, CoreError> {
        if pixel.len() != layout.channels() {
            return Err(CoreError::Validation(format!(
                "Pixel has {} samples, layout {layout:?} needs {}",
                pixel.len(),
                layout.channels()
            )));
        }
        let data = pixel
            .iter()
            .copied()
            .cycle()
            .take(sample_count(width, height, layout))
            .collect();
        Self::new(width, height, layout, data)
    }

    /// Build a raster from floating point samples, clamping each one into
    /// the valid `0..=255` pixel range and rounding to the nearest integer.
    pub fn from_f32_samples(
        width: u32,
        height: u32,
        layout: ChannelLayout,
        samples: &[f32],
    ) -> Result<Self, CoreError> {
        let data = samples.iter().map(|&s| clamp_sample(s)).collect();
        Self::new(width, height, layout, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    pub fn has_alpha(&self) -> bool {
        self.layout.has_alpha()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Samples of the pixel at `(x, y)`.
    ///
    /// Panics when the coordinate is outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        assert!(x < self.width && y < self.height, "pixel ({x}, {y}) out of bounds");
        let c = self.channels();
        let start = (y as usize * self.width as usize + x as usize) * c;
        &self.data[start..start + c]
    }

    // -----------------------------------------------------------------------
    // Channel split / merge
    // -----------------------------------------------------------------------

    /// Split a 4-channel raster into its RGB part and its alpha plane.
    ///
    /// Returns `None` for 3-channel input.
    pub fn split_alpha(&self) -> Option<(RasterImage, Vec<u8>)> {
        if !self.has_alpha() {
            return None;
        }
        let pixels = self.width as usize * self.height as usize;
        let mut rgb = Vec::with_capacity(pixels * 3);
        let mut alpha = Vec::with_capacity(pixels);
        for px in self.data.chunks_exact(4) {
            rgb.extend_from_slice(&px[..3]);
            alpha.push(px[3]);
        }
        let rgb = RasterImage {
            width: self.width,
            height: self.height,
            layout: ChannelLayout::Rgb,
            data: rgb,
        };
        Some((rgb, alpha))
    }

    /// Replicate a single-channel plane into a 3-channel raster so it can be
    /// run through an RGB-only engine.
    pub fn replicate_plane(width: u32, height: u32, plane: &[u8]) -> Result<Self, CoreError> {
        let data = plane.iter().flat_map(|&v| [v, v, v]).collect();
        Self::new(width, height, ChannelLayout::Rgb, data)
    }

    /// Recombine a magnified RGB raster with a magnified replicated-alpha
    /// raster, taking the first channel of the latter as the new alpha.
    pub fn merge_alpha(rgb: &RasterImage, alpha_rgb: &RasterImage) -> Result<Self, CoreError> {
        if rgb.layout != ChannelLayout::Rgb || alpha_rgb.layout != ChannelLayout::Rgb {
            return Err(CoreError::Validation(
                "Channel merge expects two 3-channel rasters".to_string(),
            ));
        }
        if rgb.dimensions() != alpha_rgb.dimensions() {
            return Err(CoreError::Validation(format!(
                "Channel merge size mismatch: rgb {:?}, alpha {:?}",
                rgb.dimensions(),
                alpha_rgb.dimensions()
            )));
        }
        let mut data = Vec::with_capacity(rgb.data.len() / 3 * 4);
        for (px, alpha_px) in rgb.data.chunks_exact(3).zip(alpha_rgb.data.chunks_exact(3)) {
            data.extend_from_slice(px);
            data.push(alpha_px[0]);
        }
        Self::new(rgb.width, rgb.height, ChannelLayout::Rgba, data)
    }

    // -----------------------------------------------------------------------
    // `image` crate interop
    // -----------------------------------------------------------------------

    /// Convert a decoded picture, preserving transparency when the source
    /// colour type carries an alpha channel.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        if image.color().has_alpha() {
            let buf = image.into_rgba8();
            let (width, height) = buf.dimensions();
            Self {
                width,
                height,
                layout: ChannelLayout::Rgba,
                data: buf.into_raw(),
            }
        } else {
            let buf = image.into_rgb8();
            let (width, height) = buf.dimensions();
            Self {
                width,
                height,
                layout: ChannelLayout::Rgb,
                data: buf.into_raw(),
            }
        }
    }

    pub fn to_dynamic(&self) -> Result<DynamicImage, CoreError> {
        let image = match self.layout {
            ChannelLayout::Rgb => RgbImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageRgb8),
            ChannelLayout::Rgba => RgbaImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageRgba8),
        };
        image.ok_or_else(|| CoreError::Internal("Raster buffer does not match its dimensions".into()))
    }
}

impl fmt::Debug for RasterImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

fn sample_count(width: u32, height: u32, layout: ChannelLayout) -> usize {
    width as usize * height as usize * layout.channels()
}

fn clamp_sample(sample: f32) -> u8 {
    if sample.is_nan() {
        return 0;
    }
    sample.round().clamp(0.0, 255.0) as u8
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
