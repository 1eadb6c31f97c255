//! Luminance/saturation background heuristic.
//!
//! Every pixel is classified on its own: there is no notion of a connected
//! subject, so light low-saturation regions of the subject (white shirts,
//! pale skin under strong light) are made transparent as well. This is a known
//! limitation of the heuristic, not a defect; proper segmentation is what the
//! remote service's change-background endpoint offers.

use crate::raster::RasterImage;

/// Brightness above which a low-saturation pixel is background.
pub const BACKGROUND_BRIGHTNESS: f64 = 180.0;
/// Saturation below which a bright pixel is background.
pub const BACKGROUND_SATURATION: u8 = 30;
/// Brightness above which any pixel is partially cleared.
pub const HIGHLIGHT_BRIGHTNESS: f64 = 240.0;
/// Alpha removed from highlight pixels.
pub const HIGHLIGHT_ALPHA_DROP: u8 = 150;

/// Outcome of classifying one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelClass {
    /// Bright and nearly gray: made fully transparent.
    Background,
    /// Very bright but saturated: partially transparent.
    Highlight,
    /// Left untouched.
    Subject,
}

/// Perceived brightness (ITU-R BT.601 luma weights).
pub fn brightness(r: u8, g: u8, b: u8) -> f64 {
    0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64
}

/// Spread between the strongest and weakest channel.
pub fn saturation(r: u8, g: u8, b: u8) -> u8 {
    r.max(g).max(b) - r.min(g).min(b)
}

/// First matching rule wins.
pub fn classify(r: u8, g: u8, b: u8) -> PixelClass {
    let luma = brightness(r, g, b);
    if luma > BACKGROUND_BRIGHTNESS && saturation(r, g, b) < BACKGROUND_SATURATION {
        PixelClass::Background
    } else if luma > HIGHLIGHT_BRIGHTNESS {
        PixelClass::Highlight
    } else {
        PixelClass::Subject
    }
}

/// Rewrites the alpha channel of `image` in place.
pub fn apply(image: &mut RasterImage) {
    for px in image.pixels_mut().chunks_exact_mut(4) {
        match classify(px[0], px[1], px[2]) {
            PixelClass::Background => px[3] = 0,
            PixelClass::Highlight => px[3] = px[3].saturating_sub(HIGHLIGHT_ALPHA_DROP),
            PixelClass::Subject => {}
        }
    }
}

/// Owned variant of [`apply`].
pub fn remove_background(mut image: RasterImage) -> RasterImage {
    apply(&mut image);
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(rgba: [u8; 4]) -> [u8; 4] {
        let out = remove_background(RasterImage::filled(1, 1, rgba));
        out.pixel(0, 0).unwrap()
    }

    #[test]
    fn near_white_pixel_becomes_transparent() {
        assert!((brightness(250, 248, 245) - 248.256).abs() < 1e-9);
        assert_eq!(saturation(250, 248, 245), 5);
        assert_eq!(single([250, 248, 245, 255]), [250, 248, 245, 0]);
    }

    #[test]
    fn dark_pixel_is_unchanged() {
        assert_eq!(classify(30, 30, 30), PixelClass::Subject);
        assert_eq!(single([30, 30, 30, 255]), [30, 30, 30, 255]);
    }

    #[test]
    fn bright_saturated_pixel_is_partially_cleared() {
        // brightness ~244.6, saturation 40
        assert_eq!(classify(255, 245, 215), PixelClass::Highlight);
        assert_eq!(single([255, 245, 215, 255])[3], 105);
        assert_eq!(single([255, 245, 215, 100])[3], 0);
    }

    #[test]
    fn bright_saturated_below_highlight_is_subject() {
        // brightness ~211.3, saturation 100
        assert_eq!(classify(255, 200, 155), PixelClass::Subject);
    }

    #[test]
    fn reapplying_keeps_transparent_pixels_transparent() {
        let mut image = RasterImage::filled(2, 2, [255, 255, 255, 255]);
        apply(&mut image);
        apply(&mut image);
        assert!(image.pixels().chunks_exact(4).all(|p| p[3] == 0));

        let mut highlight = RasterImage::filled(1, 1, [255, 245, 215, 0]);
        apply(&mut highlight);
        assert_eq!(highlight.pixel(0, 0).unwrap()[3], 0);
    }

    #[test]
    fn saturation_threshold_is_strict() {
        assert_eq!(classify(210, 210, 180), PixelClass::Subject);
    }
}
