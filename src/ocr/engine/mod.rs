mod geom;
mod paragraph;
mod parse;
mod preprocess;
mod tesseract;
mod text;

use anyhow::{Context, Result};
use image::RgbImage;
use serde::Serialize;
use std::io::Write;
use tracing::debug;

use crate::ocr::{BoundingBox, DetectionResult};
use crate::settings::Settings;

pub use paragraph::group_paragraphs;
pub use tesseract::list_tesseract_languages;

/// One recognised text line in page coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrLine {
    pub text: String,
    pub bbox: BoundingBox,
    pub conf: f32,
}

/// Finds text regions on a page. Implementations are created once per batch.
pub trait TextDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectionResult>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub languages: String,
    pub psm: u32,
    pub paragraph_x_ths: f32,
    pub paragraph_y_ths: f32,
    /// Boxes whose larger side is below this many pixels are dropped.
    pub min_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            languages: "jpn+eng".to_string(),
            psm: 6,
            paragraph_x_ths: 0.8,
            paragraph_y_ths: 0.5,
            min_size: 10,
        }
    }
}

impl DetectorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            languages: settings.ocr_languages.clone(),
            paragraph_x_ths: settings.paragraph_x_ths,
            paragraph_y_ths: settings.paragraph_y_ths,
            min_size: settings.min_size,
            ..Self::default()
        }
    }
}

pub struct TesseractDetector {
    config: DetectorConfig,
    languages: String,
}

impl TesseractDetector {
    /// Checks that tesseract runs and has at least one requested language.
    pub fn new(config: DetectorConfig) -> Result<Self> {
        let available = list_tesseract_languages()?;
        let languages = tesseract::normalize_ocr_languages(&config.languages, &available)?;
        debug!("tesseract ready with languages {}", languages);
        Ok(Self { config, languages })
    }
}

impl TextDetector for TesseractDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectionResult>> {
        let scale = preprocess::ocr_scale(image.width());
        let ocr_image = preprocess::preprocess_for_ocr(image, scale);
        let mut tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp file for OCR")?;
        ocr_image
            .write_to(&mut tmp, image::ImageFormat::Png)
            .with_context(|| "failed to write temp image for OCR")?;
        tmp.flush().ok();

        let tsv = tesseract::run_tesseract_tsv(tmp.path(), &self.languages, self.config.psm)?;
        let mut lines = parse::parse_tsv_lines(&tsv);
        if scale > 1 {
            for line in &mut lines {
                line.bbox = geom::scale_bbox(&line.bbox, scale as f32);
            }
        }
        let lines = filter_small_lines(lines, self.config.min_size);
        let detections = group_paragraphs(
            &lines,
            self.config.paragraph_x_ths,
            self.config.paragraph_y_ths,
        );
        debug!("{} line(s) grouped into {} region(s)", lines.len(), detections.len());
        Ok(detections)
    }
}

fn filter_small_lines(lines: Vec<OcrLine>, min_size: u32) -> Vec<OcrLine> {
    lines
        .into_iter()
        .filter(|line| line.bbox.width().max(line.bbox.height()) >= min_size)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(w: u32, h: u32) -> OcrLine {
        OcrLine {
            text: "x".to_string(),
            bbox: BoundingBox {
                x_min: 0,
                y_min: 0,
                x_max: w,
                y_max: h,
            },
            conf: 90.0,
        }
    }

    #[test]
    fn tiny_boxes_are_filtered() {
        let kept = filter_small_lines(vec![line(9, 9), line(10, 3), line(4, 12), line(2, 2)], 10);
        assert_eq!(kept, vec![line(10, 3), line(4, 12)]);
    }

    #[test]
    fn config_follows_settings() {
        let settings = Settings {
            ocr_languages: "jpn".to_string(),
            paragraph_x_ths: 1.0,
            min_size: 4,
            ..Settings::default()
        };
        let config = DetectorConfig::from_settings(&settings);
        assert_eq!(config.languages, "jpn");
        assert_eq!(config.paragraph_x_ths, 1.0);
        assert_eq!(config.paragraph_y_ths, settings.paragraph_y_ths);
        assert_eq!(config.min_size, 4);
        assert_eq!(config.psm, 6);
    }
}
