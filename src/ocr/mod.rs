mod engine;
mod font;
mod inpaint;
mod layout;
mod reconstruct;
mod region;
mod render;

pub use engine::{
    group_paragraphs, list_tesseract_languages, DetectorConfig, OcrLine, TesseractDetector,
    TextDetector,
};
pub use font::{candidate_font_paths, load_font_metrics, resolve_font, FontMetrics, ResolvedFont};
pub use inpaint::{inpaint_telea, InpaintError};
pub use layout::{centered_origin, chars_per_line, fit_layout, wrap_text, LayoutResult, TypesetConfig};
pub use reconstruct::{
    glyph_mask, is_dark_background, reconstruct_background, ReconstructOutcome,
    DARK_BACKGROUND_THRESHOLD,
};
pub use region::bounding_box;
pub use render::{PlacedText, Typesetter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box in pixel coordinates. `x_max`/`y_max` are exclusive, so the
/// box covers columns `x_min..x_max` and rows `y_min..y_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BoundingBox {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.x_max.saturating_sub(self.x_min)
    }

    pub fn height(&self) -> u32 {
        self.y_max.saturating_sub(self.y_min)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DetectionResult {
    pub polygon: Vec<Point>,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum InkColor {
    Black,
    White,
}

impl InkColor {
    /// Light ink on dark art, dark ink on light art.
    pub fn for_background(is_dark: bool) -> Self {
        if is_dark {
            InkColor::White
        } else {
            InkColor::Black
        }
    }

    pub fn fill(&self) -> &'static str {
        match self {
            InkColor::Black => "#000000",
            InkColor::White => "#ffffff",
        }
    }

    /// Outline colour drawn under the glyphs, if any. Only dark ink gets one.
    pub fn outline(&self) -> Option<&'static str> {
        match self {
            InkColor::Black => Some("#ffffff"),
            InkColor::White => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InkPlan {
    pub bbox: BoundingBox,
    pub text: String,
    pub ink: InkColor,
}
