use image::{GrayImage, Luma, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use tracing::debug;

use super::BoundingBox;
use super::inpaint::{inpaint_telea, InpaintError};

/// Mean ROI luma below this is treated as a dark background.
pub const DARK_BACKGROUND_THRESHOLD: f64 = 100.0;

const INPAINT_RADIUS: u32 = 3;
// Two passes of a 3x3 dilation equal one pass at Chebyshev radius 2.
const MASK_DILATION: u8 = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructOutcome {
    pub is_dark: bool,
    /// Number of inpainted pixels, or why the region was left as it was.
    pub inpaint: Result<usize, InpaintError>,
}

/// Erases the glyphs inside `bbox` and rebuilds the artwork underneath them
/// from the surrounding pixels of the same region.
pub fn reconstruct_background(image: &mut RgbImage, bbox: &BoundingBox) -> ReconstructOutcome {
    if bbox.is_empty() {
        return ReconstructOutcome {
            is_dark: false,
            inpaint: Ok(0),
        };
    }
    let mut roi =
        image::imageops::crop_imm(image, bbox.x_min, bbox.y_min, bbox.width(), bbox.height())
            .to_image();
    let gray = luma(&roi);
    let is_dark = is_dark_background(&gray);
    let mask = dilate(&glyph_mask(&gray, is_dark), Norm::LInf, MASK_DILATION);

    let inpaint = inpaint_telea(&mut roi, &mask, INPAINT_RADIUS);
    match &inpaint {
        Ok(filled) => {
            image::imageops::replace(image, &roi, bbox.x_min as i64, bbox.y_min as i64);
            debug!(
                "reconstructed {}x{} region at ({}, {}): {} px, dark={}",
                bbox.width(),
                bbox.height(),
                bbox.x_min,
                bbox.y_min,
                filled,
                is_dark
            );
        }
        Err(err) => {
            debug!("left region at ({}, {}) as is: {}", bbox.x_min, bbox.y_min, err);
        }
    }
    ReconstructOutcome { is_dark, inpaint }
}

/// `true` only when the mean is strictly below the threshold.
pub fn is_dark_background(gray: &GrayImage) -> bool {
    let count = gray.pixels().len();
    if count == 0 {
        return false;
    }
    let sum: u64 = gray.pixels().map(|pixel| pixel[0] as u64).sum();
    (sum as f64 / count as f64) < DARK_BACKGROUND_THRESHOLD
}

/// Otsu-binarised glyph mask. The polarity follows the background so the
/// "on" pixels are always the ink: bright strokes on dark art, dark strokes
/// on light art.
pub fn glyph_mask(gray: &GrayImage, is_dark: bool) -> GrayImage {
    let level = otsu_level(gray);
    let mut mask = GrayImage::new(gray.width(), gray.height());
    for (x, y, pixel) in gray.enumerate_pixels() {
        let above = pixel[0] > level;
        let on = if is_dark { above } else { !above };
        if on {
            mask.put_pixel(x, y, Luma([255]));
        }
    }
    mask
}

fn luma(image: &RgbImage) -> GrayImage {
    let mut gray = GrayImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let value = (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8;
        gray.put_pixel(x, y, Luma([value]));
    }
    gray
}
