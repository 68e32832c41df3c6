//! Decode uploaded bytes into a [`RasterImage`] and encode results back.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat};

use crate::error::CoreError;
use crate::raster::RasterImage;

/// File extensions accepted for uploaded images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tiff", "tif", "bmp", "webp"];

/// Encoded output format for a result artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
    WebP,
    Bmp,
    Tiff,
}

impl OutputFormat {
    /// Pick the output format from a filename's extension, defaulting to PNG.
    pub fn from_filename(filename: &str) -> Self {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" => Self::Jpeg,
            "webp" => Self::WebP,
            "bmp" => Self::Bmp,
            "tif" | "tiff" => Self::Tiff,
            _ => Self::Png,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
        }
    }

    pub fn supports_alpha(self) -> bool {
        !matches!(self, Self::Jpeg)
    }

    fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::WebP => ImageFormat::WebP,
            Self::Bmp => ImageFormat::Bmp,
            Self::Tiff => ImageFormat::Tiff,
        }
    }
}

/// MIME type for a result filename, derived from its extension.
pub fn content_type_for(filename: &str) -> String {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "png".to_string());
    format!("image/{ext}")
}

/// Decode an uploaded image.
///
/// Anything whose colour type carries alpha (RGBA, grey+alpha, palette
/// with a transparency chunk) becomes 4-channel; everything else 3-channel.
pub fn decode(bytes: &[u8]) -> Result<RasterImage, CoreError> {
    if bytes.is_empty() {
        return Err(CoreError::Validation("No file uploaded or file is empty".into()));
    }
    let image = image::load_from_memory(bytes)
        .map_err(|e| CoreError::Validation(format!("Could not decode image: {e}")))?;
    Ok(RasterImage::from_dynamic(image))
}

/// Encode a raster in the given format.
///
/// Formats without an alpha channel drop transparency here and only here.
pub fn encode(raster: &RasterImage, format: OutputFormat) -> Result<Vec<u8>, CoreError> {
    let mut image = raster.to_dynamic()?;
    if raster.has_alpha() && !format.supports_alpha() {
        image = DynamicImage::ImageRgb8(image.to_rgb8());
    }
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, format.image_format())
        .map_err(|e| CoreError::Internal(format!("Failed to encode {format:?} image: {e}")))?;
    Ok(buf.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
