use image::{DynamicImage, GrayImage, Luma, RgbImage};

const MAX_OCR_WIDTH: u32 = 4000;

/// Grayscale, upscaled and contrast-stretched copy for tesseract.
pub(super) fn preprocess_for_ocr(image: &RgbImage, scale: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let mut luma = GrayImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let value = (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8;
        luma.put_pixel(x, y, Luma([value]));
    }

    let resized = if scale > 1 {
        image::imageops::resize(
            &luma,
            width.saturating_mul(scale),
            height.saturating_mul(scale),
            image::imageops::FilterType::Lanczos3,
        )
    } else {
        luma
    };
    DynamicImage::ImageLuma8(contrast_stretch(&resized))
}

/// Small pages are upscaled (up to 2x) so tesseract sees larger glyphs.
pub(super) fn ocr_scale(width: u32) -> u32 {
    let mut scale = 2u32;
    while width.saturating_mul(scale) > MAX_OCR_WIDTH && scale > 1 {
        scale -= 1;
    }
    scale.max(1)
}

fn contrast_stretch(image: &GrayImage) -> GrayImage {
    let mut min = 255u8;
    let mut max = 0u8;
    for pixel in image.pixels() {
        let value = pixel[0];
        min = min.min(value);
        max = max.max(value);
    }

    if max <= min {
        return image.clone();
    }

    let scale = 255.0 / (max as f32 - min as f32);
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        let value = pixel[0];
        pixel[0] = ((value.saturating_sub(min)) as f32 * scale).round() as u8;
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_shrinks_for_wide_pages() {
        assert_eq!(ocr_scale(800), 2);
        assert_eq!(ocr_scale(2500), 1);
        assert_eq!(ocr_scale(9000), 1);
    }

    #[test]
    fn contrast_is_stretched_to_full_range() {
        let mut image = RgbImage::from_pixel(2, 1, image::Rgb([100, 100, 100]));
        image.put_pixel(1, 0, image::Rgb([150, 150, 150]));
        let out = preprocess_for_ocr(&image, 1).to_luma8();
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn upscaled_copy_has_scaled_dimensions() {
        let image = RgbImage::from_pixel(10, 6, image::Rgb([20, 200, 20]));
        let out = preprocess_for_ocr(&image, 2);
        assert_eq!((out.width(), out.height()), (20, 12));
    }
}
