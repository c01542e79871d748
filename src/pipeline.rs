use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, ImageFormat, RgbImage};
use serde::Serialize;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::ocr::{
    bounding_box, reconstruct_background, BoundingBox, DetectionResult, InkColor, InkPlan,
    TextDetector, Typesetter,
};
use crate::providers::ProviderKind;
use crate::translator::Translator;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    #[error("region has no text")]
    BlankText,
    #[error("region {0:?} has no area inside the page")]
    EmptyRegion(BoundingBox),
    #[error("failed to draw text: {0}")]
    Draw(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypesetRegion {
    pub bbox: BoundingBox,
    pub source_text: String,
    pub translated_text: String,
    pub provider: Option<ProviderKind>,
    pub is_dark: bool,
    pub font_size: u32,
    pub fitted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegionOutcome {
    Typeset(TypesetRegion),
    Skipped(RegionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassThroughReason {
    NoText,
    DetectionFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Typeset { regions: Vec<RegionOutcome> },
    PassThrough(PassThroughReason),
    /// The source bytes were copied because the page could not be processed.
    /// `copied` is false when an output already existed or the copy failed.
    FallbackCopy { reason: String, copied: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub outcome: FileOutcome,
}

impl FileReport {
    pub fn typeset_regions(&self) -> usize {
        match &self.outcome {
            FileOutcome::Typeset { regions } => regions
                .iter()
                .filter(|region| matches!(region, RegionOutcome::Typeset(_)))
                .count(),
            _ => 0,
        }
    }

    pub fn skipped_regions(&self) -> usize {
        match &self.outcome {
            FileOutcome::Typeset { regions } => regions.len() - self.typeset_regions(),
            _ => 0,
        }
    }

    /// One human-readable line for the host log.
    pub fn summary_line(&self) -> String {
        let name = self
            .source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string());
        match &self.outcome {
            FileOutcome::Typeset { .. } => {
                let skipped = self.skipped_regions();
                if skipped == 0 {
                    format!("{}: typeset {} region(s)", name, self.typeset_regions())
                } else {
                    format!(
                        "{}: typeset {} region(s), skipped {}",
                        name,
                        self.typeset_regions(),
                        skipped
                    )
                }
            }
            FileOutcome::PassThrough(PassThroughReason::NoText) => {
                format!("{}: no text, copied unchanged", name)
            }
            FileOutcome::PassThrough(PassThroughReason::DetectionFailed(reason)) => {
                format!("{}: detection failed ({}), copied unchanged", name, reason)
            }
            FileOutcome::FallbackCopy { reason, copied } => {
                if *copied {
                    format!("{}: failed ({}), copied original", name, reason)
                } else {
                    format!("{}: failed ({})", name, reason)
                }
            }
        }
    }
}

/// Runs one page through detection, background reconstruction, translation
/// and typesetting. The collaborators are shared by every page of a batch.
pub struct PagePipeline<D: TextDetector> {
    detector: D,
    translator: Translator,
    typesetter: Typesetter,
}

struct PendingRegion {
    plan: InkPlan,
    source_text: String,
    provider: Option<ProviderKind>,
    is_dark: bool,
}

impl<D: TextDetector> PagePipeline<D> {
    pub fn new(detector: D, translator: Translator, typesetter: Typesetter) -> Self {
        Self {
            detector,
            translator,
            typesetter,
        }
    }

    /// Processes `source` into `destination`. Never fails: every error ends in
    /// a pass-through or fallback copy so each input gets an output.
    pub async fn process_file(&self, source: &Path, destination: &Path) -> FileReport {
        let outcome = match self.try_process_file(source, destination).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("failed to process {}: {:#}", source.display(), err);
                fallback_copy(source, destination, format!("{:#}", err))
            }
        };
        FileReport {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            outcome,
        }
    }

    async fn try_process_file(&self, source: &Path, destination: &Path) -> Result<FileOutcome> {
        let bytes =
            fs::read(source).with_context(|| format!("failed to read {}", source.display()))?;
        let mut image = decode_rgb(&bytes)?;

        let detections = match self.detector.detect(&image) {
            Ok(detections) => detections,
            Err(err) => {
                warn!("text detection failed for {}: {:#}", source.display(), err);
                write_output(destination, &bytes)?;
                return Ok(FileOutcome::PassThrough(PassThroughReason::DetectionFailed(
                    format!("{:#}", err),
                )));
            }
        };
        if detections.is_empty() {
            write_output(destination, &bytes)?;
            return Ok(FileOutcome::PassThrough(PassThroughReason::NoText));
        }

        // All regions are cleaned before any text is drawn so overlapping
        // boxes cannot erase freshly typeset text.
        let mut outcomes = Vec::with_capacity(detections.len());
        let mut pending = Vec::new();
        for detection in &detections {
            match self.prepare_region(&mut image, detection).await {
                Ok(region) => pending.push(region),
                Err(err) => {
                    debug!("skipping region: {}", err);
                    outcomes.push(RegionOutcome::Skipped(err));
                }
            }
        }
        for region in pending {
            outcomes.push(self.draw_region(&mut image, region));
        }

        let encoded = encode_for_path(image, destination)?;
        write_output(destination, &encoded)?;
        Ok(FileOutcome::Typeset { regions: outcomes })
    }

    async fn prepare_region(
        &self,
        image: &mut RgbImage,
        detection: &DetectionResult,
    ) -> Result<PendingRegion, RegionError> {
        let source_text = detection.text.trim();
        if source_text.is_empty() {
            return Err(RegionError::BlankText);
        }
        let bbox = bounding_box(&detection.polygon, image.width(), image.height());
        if bbox.is_empty() {
            return Err(RegionError::EmptyRegion(bbox));
        }
        let reconstructed = reconstruct_background(image, &bbox);
        if let Err(err) = &reconstructed.inpaint {
            warn!("background left as is for {:?}: {}", bbox, err);
        }
        let translation = self.translator.translate(source_text).await;
        Ok(PendingRegion {
            plan: InkPlan {
                bbox,
                text: translation.text,
                ink: InkColor::for_background(reconstructed.is_dark),
            },
            source_text: source_text.to_string(),
            provider: translation.provider,
            is_dark: reconstructed.is_dark,
        })
    }

    fn draw_region(&self, image: &mut RgbImage, region: PendingRegion) -> RegionOutcome {
        match self.typesetter.draw(image, &region.plan) {
            Ok(placed) => RegionOutcome::Typeset(TypesetRegion {
                bbox: region.plan.bbox,
                source_text: region.source_text,
                translated_text: region.plan.text,
                provider: region.provider,
                is_dark: region.is_dark,
                font_size: placed.layout.font_size,
                fitted: placed.layout.fitted,
            }),
            Err(err) => {
                warn!("failed to draw text in {:?}: {:#}", region.plan.bbox, err);
                RegionOutcome::Skipped(RegionError::Draw(format!("{:#}", err)))
            }
        }
    }
}

/// Decodes any supported format into RGB8, dropping alpha.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes).with_context(|| "failed to decode image")?;
    Ok(image.to_rgb8())
}

/// Encodes in the format implied by the destination's extension.
pub fn encode_for_path(image: RgbImage, destination: &Path) -> Result<Vec<u8>> {
    let format = ImageFormat::from_path(destination).map_err(|_| {
        anyhow!(
            "unsupported output image format: {}",
            destination.display()
        )
    })?;
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .with_context(|| format!("failed to encode {}", destination.display()))?;
    Ok(bytes)
}

fn write_output(destination: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(destination, bytes)
        .with_context(|| format!("failed to write {}", destination.display()))
}

fn fallback_copy(source: &Path, destination: &Path, reason: String) -> FileOutcome {
    if destination.exists() {
        return FileOutcome::FallbackCopy {
            reason,
            copied: false,
        };
    }
    let copied = match fs::copy(source, destination) {
        Ok(_) => true,
        Err(err) => {
            warn!(
                "failed to copy {} to {}: {}",
                source.display(),
                destination.display(),
                err
            );
            false
        }
    };
    FileOutcome::FallbackCopy { reason, copied }
}

#[cfg(test)]
pub(crate) mod fakes {
    use anyhow::{anyhow, Result};
    use image::RgbImage;

    use crate::ocr::{DetectionResult, Point, TextDetector};

    /// Detector returning a fixed answer for every page.
    pub(crate) enum FixedDetector {
        Regions(Vec<DetectionResult>),
        Fails,
    }

    impl FixedDetector {
        pub(crate) fn none() -> Self {
            FixedDetector::Regions(Vec::new())
        }

        pub(crate) fn rect(x0: i32, y0: i32, x1: i32, y1: i32, text: &str) -> DetectionResult {
            DetectionResult {
                polygon: vec![
                    Point::new(x0, y0),
                    Point::new(x1, y0),
                    Point::new(x1, y1),
                    Point::new(x0, y1),
                ],
                text: text.to_string(),
            }
        }
    }

    impl TextDetector for FixedDetector {
        fn detect(&self, _image: &RgbImage) -> Result<Vec<DetectionResult>> {
            match self {
                FixedDetector::Regions(regions) => Ok(regions.clone()),
                FixedDetector::Fails => Err(anyhow!("detector crashed")),
            }
        }
    }
}
