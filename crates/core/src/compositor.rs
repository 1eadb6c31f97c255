//! Flattens a source raster onto a fixed-size canvas.

use crate::error::{AppError, Result};
use crate::geometry::DrawRect;
use crate::presets::Rgb;
use crate::raster::RasterImage;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

/// What the canvas holds before the source is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    Solid(Rgb),
    /// Fully transparent black, as a freshly sized canvas.
    Transparent,
}

impl Fill {
    fn rgba(self) -> Rgba<u8> {
        match self {
            Fill::Solid(rgb) => Rgba(rgb.to_rgba()),
            Fill::Transparent => Rgba([0, 0, 0, 0]),
        }
    }
}

/// Largest canvas [`composite`] will allocate, in pixels.
pub const MAX_CANVAS_PIXELS: u64 = 1 << 26;

/// Draws `source` scaled into `rect` on a `width`x`height` canvas pre-filled
/// with `fill`. Parts of the scaled source outside the canvas are clipped.
///
/// Only the part of the source that lands on the canvas is cropped and
/// scaled, so the work is bounded by the canvas size however far the draw
/// rectangle overflows it.
///
/// With a solid fill the result is opaque everywhere: transparent source
/// pixels blend over the background.
///
/// # Errors
///
/// - [`AppError::InvalidImage`] if the source is empty.
/// - [`AppError::InvalidDimension`] if the canvas or the draw rectangle has
///   no area, the canvas exceeds [`MAX_CANVAS_PIXELS`], or the draw
///   rectangle does not fit in pixel coordinates.
pub fn composite(
    source: &RasterImage,
    rect: &DrawRect,
    width: u32,
    height: u32,
    fill: Fill,
) -> Result<RasterImage> {
    if source.is_empty() {
        return Err(AppError::InvalidImage);
    }
    if width == 0 || height == 0 || width as u64 * height as u64 > MAX_CANVAS_PIXELS {
        return Err(AppError::InvalidDimension { width, height });
    }

    let draw_width = rect.draw_width.round();
    let draw_height = rect.draw_height.round();
    let side = 1.0..=u32::MAX as f64;
    let offset = -(u32::MAX as f64)..=u32::MAX as f64;
    if !(side.contains(&draw_width)
        && side.contains(&draw_height)
        && offset.contains(&rect.offset_x)
        && offset.contains(&rect.offset_y))
    {
        return Err(AppError::InvalidDimension {
            width: draw_width.clamp(0.0, u32::MAX as f64) as u32,
            height: draw_height.clamp(0.0, u32::MAX as f64) as u32,
        });
    }

    let mut canvas = RgbaImage::from_pixel(width, height, fill.rgba());

    let (draw_width, draw_height) = (draw_width as i64, draw_height as i64);
    let (x, y) = (rect.offset_x.round() as i64, rect.offset_y.round() as i64);

    // visible part of the draw rect, in canvas coordinates
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + draw_width).min(width as i64);
    let y1 = (y + draw_height).min(height as i64);
    if x0 >= x1 || y0 >= y1 {
        return Ok(canvas.into());
    }

    let (source_width, source_height) = source.dimensions();
    let (sx, sw) = source_span(x0 - x, x1 - x, draw_width, source_width);
    let (sy, sh) = source_span(y0 - y, y1 - y, draw_height, source_height);

    let source = source.to_rgba_image();
    let visible = imageops::crop_imm(&source, sx, sy, sw, sh).to_image();
    let (visible_width, visible_height) = ((x1 - x0) as u32, (y1 - y0) as u32);
    let scaled = if visible.dimensions() == (visible_width, visible_height) {
        visible
    } else {
        imageops::resize(&visible, visible_width, visible_height, FilterType::Triangle)
    };

    draw_over(&mut canvas, &scaled, x0, y0);

    Ok(canvas.into())
}

/// Maps `start..end` along a side drawn `draw` pixels long back onto a
/// source side of `len` pixels. Returns the origin and length of the source
/// span, widened to whole pixels and at least one pixel long.
fn source_span(start: i64, end: i64, draw: i64, len: u32) -> (u32, u32) {
    let scale = len as f64 / draw as f64;
    let from = ((start as f64 * scale).floor() as u32).min(len - 1);
    let to = ((end as f64 * scale).ceil() as u32).clamp(from + 1, len);
    (from, to - from)
}

/// Source-over blend of `top` onto `canvas` with its origin at `(x, y)`,
/// clipped to the canvas.
fn draw_over(canvas: &mut RgbaImage, top: &RgbaImage, x: i64, y: i64) {
    let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);
    let (tw, th) = (top.width() as i64, top.height() as i64);

    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + tw).min(cw);
    let y1 = (y + th).min(ch);

    for cy in y0..y1 {
        for cx in x0..x1 {
            let src = top.get_pixel((cx - x) as u32, (cy - y) as u32);
            let dst = canvas.get_pixel_mut(cx as u32, cy as u32);
            blend_pixel(dst, src);
        }
    }
}

fn blend_pixel(dst: &mut Rgba<u8>, src: &Rgba<u8>) {
    let src_a = src[3];
    if src_a == 255 {
        *dst = *src;
        return;
    }
    if src_a == 0 {
        return;
    }

    let sa = src_a as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);

    let mut out = [0u8; 4];
    for c in 0..3 {
        let value = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        out[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round() as u8;
    *dst = Rgba(out);
}
