//! Aspect-fill ("cover") placement of a source image on a target canvas.

use crate::error::{AppError, Result};

/// Where and how large to draw the source on the canvas.
///
/// Offsets are relative to the canvas origin and are zero or negative for a
/// cover fit; the negative axis is the one that gets cropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawRect {
    pub draw_width: f64,
    pub draw_height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

/// Scales `source` so it covers `target` without distortion, centered.
///
/// A source relatively wider than the target is fitted to the target height
/// and cropped left/right; otherwise it is fitted to the width and cropped
/// top/bottom.
///
/// # Errors
///
/// Returns [`AppError::InvalidDimension`] if any side is zero.
pub fn cover_rect(
    source_width: u32,
    source_height: u32,
    target_width: u32,
    target_height: u32,
) -> Result<DrawRect> {
    if source_width == 0 || source_height == 0 {
        return Err(AppError::InvalidDimension {
            width: source_width,
            height: source_height,
        });
    }
    if target_width == 0 || target_height == 0 {
        return Err(AppError::InvalidDimension {
            width: target_width,
            height: target_height,
        });
    }

    let (sw, sh) = (source_width as f64, source_height as f64);
    let (tw, th) = (target_width as f64, target_height as f64);

    // sw/sh > tw/th, compared exactly
    let source_wider = source_width as u64 * target_height as u64
        > target_width as u64 * source_height as u64;

    let rect = if source_wider {
        let draw_width = th * sw / sh;
        DrawRect {
            draw_width,
            draw_height: th,
            offset_x: (tw - draw_width) / 2.0,
            offset_y: 0.0,
        }
    } else {
        let draw_height = tw * sh / sw;
        DrawRect {
            draw_width: tw,
            draw_height,
            offset_x: 0.0,
            offset_y: (th - draw_height) / 2.0,
        }
    };
    Ok(rect)
}
