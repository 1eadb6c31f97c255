//! Cosmetic and geometric filters.
//!
//! Enhancement filters (brightness, contrast, saturation, sharpen) blend the
//! image with a degenerate version of itself: a factor of 1.0 returns the
//! image unchanged, 0.0 returns the degenerate image, and values above 1.0
//! extrapolate away from it. Alpha is carried through untouched.

use crate::error::{AppError, Result};
use crate::raster::RasterImage;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest side accepted by [`Filter::Resize`].
pub const MAX_RESIZE_SIDE: u32 = 4096;

/// Flip axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlipDirection {
    Horizontal,
    Vertical,
}

impl FlipDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            FlipDirection::Horizontal => "horizontal",
            FlipDirection::Vertical => "vertical",
        }
    }
}

impl FromStr for FlipDirection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "horizontal" | "h" => Ok(FlipDirection::Horizontal),
            "vertical" | "v" => Ok(FlipDirection::Vertical),
            _ => Err(AppError::parameter(
                "Direction must be 'horizontal' or 'vertical'",
            )),
        }
    }
}

/// One image adjustment with its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Filter {
    /// 0.1..=3.0
    Brightness(f32),
    /// 0.1..=3.0
    Contrast(f32),
    /// 0.0..=3.0
    Saturation(f32),
    /// Gaussian radius, 1..=20
    Blur(u32),
    /// 0.1..=3.0
    Sharpen(f32),
    Grayscale,
    Sepia,
    /// Stretch to exactly `width`x`height`, each 1..=4096.
    Resize { width: u32, height: u32 },
    /// Rectangle that must lie inside the image.
    Crop { x: u32, y: u32, width: u32, height: u32 },
    /// Degrees counter-clockwise, -360..=360; the canvas grows to fit.
    Rotate(f32),
    Flip(FlipDirection),
}

fn check_factor(name: &str, value: f32, min: f32, max: f32) -> Result<()> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(AppError::parameter(format!(
            "{name} must be between {min} and {max}, got {value}"
        )))
    }
}

impl Filter {
    /// Endpoint-style name, e.g. "brightness".
    pub fn name(&self) -> &'static str {
        match self {
            Filter::Brightness(_) => "brightness",
            Filter::Contrast(_) => "contrast",
            Filter::Saturation(_) => "saturation",
            Filter::Blur(_) => "blur",
            Filter::Sharpen(_) => "sharpen",
            Filter::Grayscale => "grayscale",
            Filter::Sepia => "sepia",
            Filter::Resize { .. } => "resize",
            Filter::Crop { .. } => "crop",
            Filter::Rotate(_) => "rotate",
            Filter::Flip(_) => "flip",
        }
    }

    /// Checks parameter ranges without touching any pixels.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Filter::Brightness(f) => check_factor("Brightness factor", f, 0.1, 3.0),
            Filter::Contrast(f) => check_factor("Contrast factor", f, 0.1, 3.0),
            Filter::Saturation(f) => check_factor("Saturation factor", f, 0.0, 3.0),
            Filter::Sharpen(f) => check_factor("Sharpening factor", f, 0.1, 3.0),
            Filter::Blur(radius) if (1..=20).contains(&radius) => Ok(()),
            Filter::Blur(radius) => Err(AppError::parameter(format!(
                "Blur radius must be between 1 and 20, got {radius}"
            ))),
            Filter::Resize { width, height } => {
                let valid = 1..=MAX_RESIZE_SIDE;
                if valid.contains(&width) && valid.contains(&height) {
                    Ok(())
                } else {
                    Err(AppError::parameter(format!(
                        "Resize dimensions must be between 1 and {MAX_RESIZE_SIDE}, got {width}x{height}"
                    )))
                }
            }
            Filter::Crop { width, height, .. } if width == 0 || height == 0 => Err(
                AppError::parameter("Crop width and height must be at least 1"),
            ),
            Filter::Rotate(angle) => check_factor("Rotation angle", angle, -360.0, 360.0),
            Filter::Crop { .. } | Filter::Grayscale | Filter::Sepia | Filter::Flip(_) => Ok(()),
        }
    }

    /// Applies the filter, producing a new raster.
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidParameter`] for out-of-range parameters or a crop
    ///   rectangle outside the image.
    /// - [`AppError::InvalidImage`] for an empty source.
    pub fn apply(&self, image: &RasterImage) -> Result<RasterImage> {
        self.validate()?;
        if image.is_empty() {
            return Err(AppError::InvalidImage);
        }

        let source = image.to_rgba_image();
        let out = match *self {
            Filter::Brightness(factor) => {
                let black = RgbaImage::from_pixel(source.width(), source.height(), Rgba([0, 0, 0, 255]));
                blend(&black, &source, factor)
            }
            Filter::Contrast(factor) => {
                let mean = mean_luma(&source);
                let gray = RgbaImage::from_pixel(
                    source.width(),
                    source.height(),
                    Rgba([mean, mean, mean, 255]),
                );
                blend(&gray, &source, factor)
            }
            Filter::Saturation(factor) => blend(&grayscale(&source), &source, factor),
            Filter::Sharpen(factor) => blend(&smooth(&source), &source, factor),
            Filter::Blur(radius) => imageops::blur(&source, radius as f32),
            Filter::Grayscale => grayscale(&source),
            Filter::Sepia => sepia(&source),
            Filter::Resize { width, height } => {
                imageops::resize(&source, width, height, FilterType::Lanczos3)
            }
            Filter::Crop {
                x,
                y,
                width,
                height,
            } => {
                let fits = x as u64 + width as u64 <= source.width() as u64
                    && y as u64 + height as u64 <= source.height() as u64;
                if !fits {
                    return Err(AppError::parameter(format!(
                        "Crop {width}x{height}+{x}+{y} exceeds image {}x{}",
                        source.width(),
                        source.height()
                    )));
                }
                imageops::crop_imm(&source, x, y, width, height).to_image()
            }
            Filter::Rotate(angle) => rotate(&source, angle),
            Filter::Flip(FlipDirection::Horizontal) => imageops::flip_horizontal(&source),
            Filter::Flip(FlipDirection::Vertical) => imageops::flip_vertical(&source),
        };
        Ok(out.into())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Filter::Brightness(v) | Filter::Contrast(v) | Filter::Saturation(v) | Filter::Sharpen(v) => {
                write!(f, "{}={v}", self.name())
            }
            Filter::Blur(radius) => write!(f, "blur={radius}"),
            Filter::Grayscale | Filter::Sepia => f.write_str(self.name()),
            Filter::Resize { width, height } => write!(f, "resize={width}x{height}"),
            Filter::Crop {
                x,
                y,
                width,
                height,
            } => write!(f, "crop={x},{y},{width},{height}"),
            Filter::Rotate(angle) => write!(f, "rotate={angle}"),
            Filter::Flip(direction) => write!(f, "flip={}", direction.as_str()),
        }
    }
}

/// Parses `name[=value]`, e.g. `brightness=1.2`, `resize=600x400`,
/// `crop=0,0,100,100`, `flip=vertical`, `sepia`.
impl FromStr for Filter {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let (name, value) = match s.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim())),
            None => (s.trim(), None),
        };
        let bad = || AppError::parameter(format!("invalid filter '{s}'"));
        let value = || value.ok_or_else(bad);
        let float = || -> Result<f32> { value()?.parse::<f32>().map_err(|_| bad()) };
        let uint = |v: &str| -> Result<u32> { v.trim().parse::<u32>().map_err(|_| bad()) };

        let filter = match name.to_ascii_lowercase().as_str() {
            "brightness" => Filter::Brightness(float()?),
            "contrast" => Filter::Contrast(float()?),
            "saturation" => Filter::Saturation(float()?),
            "sharpen" => Filter::Sharpen(float()?),
            "blur" => Filter::Blur(uint(value()?)?),
            "grayscale" => Filter::Grayscale,
            "sepia" => Filter::Sepia,
            "rotate" => Filter::Rotate(float()?),
            "flip" => Filter::Flip(value()?.parse()?),
            "resize" => {
                let (w, h) = value()?.split_once(['x', 'X']).ok_or_else(bad)?;
                Filter::Resize {
                    width: uint(w)?,
                    height: uint(h)?,
                }
            }
            "crop" => {
                let parts = value()?
                    .split(',')
                    .map(uint)
                    .collect::<Result<Vec<_>>>()?;
                let &[x, y, width, height] = parts.as_slice() else {
                    return Err(bad());
                };
                Filter::Crop {
                    x,
                    y,
                    width,
                    height,
                }
            }
            _ => return Err(bad()),
        };
        filter.validate()?;
        Ok(filter)
    }
}

/// `degenerate + (image - degenerate) * factor`, alpha from `image`.
fn blend(degenerate: &RgbaImage, image: &RgbaImage, factor: f32) -> RgbaImage {
    let mut out = image.clone();
    for ((dst, deg), src) in out.pixels_mut().zip(degenerate.pixels()).zip(image.pixels()) {
        for c in 0..3 {
            let d = deg[c] as f32;
            let v = d + (src[c] as f32 - d) * factor;
            dst[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Integer luma with ITU-R 601-2 weights.
fn luma(px: &Rgba<u8>) -> u8 {
    ((px[0] as u32 * 299 + px[1] as u32 * 587 + px[2] as u32 * 114) / 1000) as u8
}

fn mean_luma(image: &RgbaImage) -> u8 {
    let count = image.width() as u64 * image.height() as u64;
    if count == 0 {
        return 0;
    }
    let sum: u64 = image.pixels().map(|px| luma(px) as u64).sum();
    ((sum as f64 / count as f64) + 0.5) as u8
}

fn grayscale(image: &RgbaImage) -> RgbaImage {
    let mut out = image.clone();
    for px in out.pixels_mut() {
        let l = luma(px);
        *px = Rgba([l, l, l, px[3]]);
    }
    out
}

/// 3x3 smoothing kernel (center weight 5, total 13); border pixels are kept.
fn smooth(image: &RgbaImage) -> RgbaImage {
    let (w, h) = image.dimensions();
    let mut out = image.clone();
    if w < 3 || h < 3 {
        return out;
    }
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut acc = [0u32; 3];
            for dy in 0..3 {
                for dx in 0..3 {
                    let weight = if dx == 1 && dy == 1 { 5 } else { 1 };
                    let px = image.get_pixel(x + dx - 1, y + dy - 1);
                    for c in 0..3 {
                        acc[c] += px[c] as u32 * weight;
                    }
                }
            }
            let dst = out.get_pixel_mut(x, y);
            for c in 0..3 {
                dst[c] = ((acc[c] as f32) / 13.0).round() as u8;
            }
        }
    }
    out
}

const SEPIA: [[f32; 3]; 3] = [
    [0.393, 0.769, 0.189],
    [0.349, 0.686, 0.168],
    [0.272, 0.534, 0.131],
];

/// Sepia matrix, then every channel rescaled so the brightest value is 255.
fn sepia(image: &RgbaImage) -> RgbaImage {
    let toned: Vec<[f32; 3]> = image
        .pixels()
        .map(|px| {
            let (r, g, b) = (px[0] as f32, px[1] as f32, px[2] as f32);
            SEPIA.map(|row| row[0] * r + row[1] * g + row[2] * b)
        })
        .collect();
    let max = toned
        .iter()
        .flat_map(|px| px.iter().copied())
        .fold(0.0f32, f32::max);

    let mut out = image.clone();
    for (dst, px) in out.pixels_mut().zip(&toned) {
        for c in 0..3 {
            dst[c] = if max > 0.0 {
                (px[c] / max * 255.0) as u8
            } else {
                0
            };
        }
    }
    out
}

/// Counter-clockwise rotation with an expanded, transparent-filled canvas.
fn rotate(image: &RgbaImage, degrees: f32) -> RgbaImage {
    let normalized = degrees.rem_euclid(360.0);
    if normalized == 0.0 {
        return image.clone();
    }
    if normalized == 90.0 {
        return imageops::rotate270(image);
    }
    if normalized == 180.0 {
        return imageops::rotate180(image);
    }
    if normalized == 270.0 {
        return imageops::rotate90(image);
    }

    let theta = (normalized as f64).to_radians();
    let (sin, cos) = theta.sin_cos();
    let (w, h) = (image.width() as f64, image.height() as f64);
    let out_w = (w * cos.abs() + h * sin.abs()).ceil().max(1.0) as u32;
    let out_h = (w * sin.abs() + h * cos.abs()).ceil().max(1.0) as u32;

    let (cx, cy) = (w / 2.0, h / 2.0);
    let (ocx, ocy) = (out_w as f64 / 2.0, out_h as f64 / 2.0);

    let mut out = RgbaImage::from_pixel(out_w, out_h, Rgba([0, 0, 0, 0]));
    for (x, y, dst) in out.enumerate_pixels_mut() {
        // inverse map the destination pixel center back into the source
        let dx = x as f64 + 0.5 - ocx;
        let dy = y as f64 + 0.5 - ocy;
        let sx = cos * dx - sin * dy + cx - 0.5;
        let sy = sin * dx + cos * dy + cy - 0.5;
        if let Some(px) = sample_bilinear(image, sx, sy) {
            *dst = px;
        }
    }
    out
}

fn sample_bilinear(image: &RgbaImage, x: f64, y: f64) -> Option<Rgba<u8>> {
    let (w, h) = (image.width() as f64, image.height() as f64);
    if x < -0.5 || y < -0.5 || x > w - 0.5 || y > h - 0.5 {
        return None;
    }
    let x = x.clamp(0.0, w - 1.0);
    let y = y.clamp(0.0, h - 1.0);
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let x1 = (x0 + 1).min(image.width() - 1);
    let y1 = (y0 + 1).min(image.height() - 1);
    let (fx, fy) = (x - x0 as f64, y - y0 as f64);

    let p00 = image.get_pixel(x0, y0);
    let p10 = image.get_pixel(x1, y0);
    let p01 = image.get_pixel(x0, y1);
    let p11 = image.get_pixel(x1, y1);

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round() as u8;
    }
    Some(Rgba(out))
}
