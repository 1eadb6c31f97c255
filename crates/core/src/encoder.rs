//! Encoding rasters to JPEG/PNG and decoding uploads back into rasters.

use crate::error::{AppError, Result};
use crate::raster::RasterImage;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quality used for JPEG output unless configured otherwise.
pub const DEFAULT_JPEG_QUALITY: f32 = 0.9;

/// Encoded output format.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    /// Lossy, no alpha. `quality` is in `0.0..=1.0`.
    Jpeg { quality: f32 },
    /// Lossless, keeps the alpha channel.
    Png,
}

impl OutputFormat {
    /// JPEG with `quality` clamped to `0.0..=1.0`.
    pub fn jpeg(quality: f32) -> Self {
        let quality = if quality.is_finite() {
            quality.clamp(0.0, 1.0)
        } else {
            DEFAULT_JPEG_QUALITY
        };
        Self::Jpeg { quality }
    }

    pub fn kind(self) -> FormatKind {
        match self {
            Self::Jpeg { .. } => FormatKind::Jpeg,
            Self::Png => FormatKind::Png,
        }
    }

    pub fn extension(self) -> &'static str {
        self.kind().extension()
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::jpeg(DEFAULT_JPEG_QUALITY)
    }
}

/// Format without parameters, as chosen by the user and persisted in
/// settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    #[default]
    Jpeg,
    Png,
}

impl FormatKind {
    pub fn extension(self) -> &'static str {
        match self {
            FormatKind::Jpeg => "jpeg",
            FormatKind::Png => "png",
        }
    }

    /// Attaches a JPEG quality; ignored for PNG.
    pub fn with_quality(self, quality: f32) -> OutputFormat {
        match self {
            FormatKind::Jpeg => OutputFormat::jpeg(quality),
            FormatKind::Png => OutputFormat::Png,
        }
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for FormatKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(FormatKind::Jpeg),
            "png" => Ok(FormatKind::Png),
            other => Err(AppError::parameter(format!("unknown format '{other}'"))),
        }
    }
}

/// Serializes `image` in `format`.
///
/// JPEG drops the alpha channel and keeps whatever color each pixel holds;
/// PNG stores RGBA unchanged.
///
/// # Errors
///
/// Returns [`AppError::InvalidImage`] for an empty raster and
/// [`AppError::Encode`] if the codec fails.
pub fn encode(image: &RasterImage, format: OutputFormat) -> Result<Vec<u8>> {
    if image.is_empty() {
        return Err(AppError::InvalidImage);
    }
    let (width, height) = image.dimensions();
    let mut buffer = Vec::new();

    match format {
        OutputFormat::Jpeg { quality } => {
            let rgb: Vec<u8> = image
                .pixels()
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect();
            let quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
            JpegEncoder::new_with_quality(&mut buffer, quality)
                .write_image(&rgb, width, height, ExtendedColorType::Rgb8)
                .map_err(|e| AppError::encode(format!("JPEG: {e}")))?;
        }
        OutputFormat::Png => {
            PngEncoder::new(&mut buffer)
                .write_image(image.pixels(), width, height, ExtendedColorType::Rgba8)
                .map_err(|e| AppError::encode(format!("PNG: {e}")))?;
        }
    }

    Ok(buffer)
}

/// Decodes JPEG/PNG/WebP bytes into an RGBA raster.
///
/// # Errors
///
/// Returns [`AppError::Decode`] for corrupt or unsupported input.
pub fn decode(bytes: &[u8]) -> Result<RasterImage> {
    let image: DynamicImage =
        image::load_from_memory(bytes).map_err(|e| AppError::decode(e.to_string()))?;
    Ok(image.into())
}

/// `data:` URL for previewing encoded bytes.
pub fn to_data_url(bytes: &[u8], format: OutputFormat) -> String {
    format!("data:{};base64,{}", format.mime(), BASE64.encode(bytes))
}
