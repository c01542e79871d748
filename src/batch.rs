use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ocr::{
    candidate_font_paths, resolve_font, DetectorConfig, TesseractDetector, TextDetector,
    TypesetConfig, Typesetter,
};
use crate::pipeline::{FileOutcome, FileReport, PagePipeline};
use crate::settings::Settings;
use crate::translator::Translator;

pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Started { total: usize },
    /// Emitted before file `index` (1-based) is processed.
    Progress {
        index: usize,
        total: usize,
        file: PathBuf,
    },
    Log { line: String },
    Finished { summary: BatchSummary },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub files_typeset: usize,
    pub files_passed_through: usize,
    pub files_fallback_copied: usize,
    pub regions_typeset: usize,
    pub regions_skipped: usize,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn files_processed(&self) -> usize {
        self.files_typeset + self.files_passed_through + self.files_fallback_copied
    }

    fn record(&mut self, report: &FileReport) {
        match report.outcome {
            FileOutcome::Typeset { .. } => self.files_typeset += 1,
            FileOutcome::PassThrough(_) => self.files_passed_through += 1,
            FileOutcome::FallbackCopy { .. } => self.files_fallback_copied += 1,
        }
        self.regions_typeset += report.typeset_regions();
        self.regions_skipped += report.skipped_regions();
    }
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} file(s): {} typeset, {} unchanged, {} copied after failure; {} region(s) typeset, {} skipped",
            self.files_processed(),
            self.files_typeset,
            self.files_passed_through,
            self.files_fallback_copied,
            self.regions_typeset,
            self.regions_skipped
        )?;
        if self.cancelled {
            f.write_str(" (cancelled)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub settings: Settings,
}

/// Host side of a running batch.
pub struct BatchHandle {
    pub events: Receiver<BatchEvent>,
    cancel: CancellationToken,
    join: JoinHandle<Result<BatchSummary>>,
}

impl BatchHandle {
    /// Stops the batch after the file currently being processed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn join(self) -> Result<BatchSummary> {
        self.join
            .join()
            .map_err(|_| anyhow!("batch worker panicked"))?
    }
}

/// Starts the batch on a background worker using the tesseract detector.
pub fn spawn_batch(request: BatchRequest) -> BatchHandle {
    spawn_batch_with(request, |settings| {
        TesseractDetector::new(DetectorConfig::from_settings(settings))
    })
}

/// Starts the batch with a custom detector. `init` runs once on the worker
/// before any file; its failure aborts the batch.
pub fn spawn_batch_with<D, F>(request: BatchRequest, init: F) -> BatchHandle
where
    D: TextDetector + 'static,
    F: FnOnce(&Settings) -> Result<D> + Send + 'static,
{
    let (sender, events) = unbounded();
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let join = std::thread::spawn(move || {
        let result = run_worker(request, init, &sender, token);
        if let Err(err) = &result {
            warn!("batch aborted: {:#}", err);
            let _ = sender.send(BatchEvent::Log {
                line: format!("batch aborted: {:#}", err),
            });
        }
        result
    });
    BatchHandle {
        events,
        cancel,
        join,
    }
}

fn run_worker<D, F>(
    request: BatchRequest,
    init: F,
    events: &Sender<BatchEvent>,
    cancel: CancellationToken,
) -> Result<BatchSummary>
where
    D: TextDetector,
    F: FnOnce(&Settings) -> Result<D>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .with_context(|| "failed to start the batch runtime")?;

    let settings = &request.settings;
    let detector = init(settings).with_context(|| "failed to initialize text detection")?;
    let font_path = settings.font_path.as_deref().map(Path::new);
    let font = resolve_font(font_path, candidate_font_paths())?;
    let typesetter = Typesetter::new(font, TypesetConfig::from_settings(settings));
    let pipeline = PagePipeline::new(detector, Translator::from_settings(settings), typesetter);

    runtime.block_on(run_batch(
        &pipeline,
        &request.input_dir,
        &request.output_dir,
        &settings.output_prefix,
        &cancel,
        events,
    ))
}

/// Processes every image in `input_dir` in name order, checking `cancel`
/// before each file.
pub async fn run_batch<D: TextDetector>(
    pipeline: &PagePipeline<D>,
    input_dir: &Path,
    output_dir: &Path,
    prefix: &str,
    cancel: &CancellationToken,
    events: &Sender<BatchEvent>,
) -> Result<BatchSummary> {
    let files = list_input_images(input_dir)?;
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let total = files.len();
    let _ = events.send(BatchEvent::Started { total });
    info!("processing {} image(s) from {}", total, input_dir.display());

    let mut summary = BatchSummary::default();
    for (idx, file) in files.iter().enumerate() {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            let _ = events.send(BatchEvent::Log {
                line: format!("cancelled after {} of {} file(s)", idx, total),
            });
            break;
        }
        let index = idx + 1;
        let _ = events.send(BatchEvent::Progress {
            index,
            total,
            file: file.clone(),
        });
        let destination = output_path(output_dir, file, prefix)?;
        let report = pipeline.process_file(file, &destination).await;
        let line = format!("[{}/{}] {}", index, total, report.summary_line());
        info!("{}", line);
        let _ = events.send(BatchEvent::Log { line });
        summary.record(&report);
    }

    let _ = events.send(BatchEvent::Finished {
        summary: summary.clone(),
    });
    Ok(summary)
}

/// Image files directly inside `dir`, sorted by file name.
pub fn list_input_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to read {}", dir.display()))?
            .path();
        if path.is_file() && is_supported_image(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

pub fn output_path(output_dir: &Path, source: &Path, prefix: &str) -> Result<PathBuf> {
    let name = source
        .file_name()
        .ok_or_else(|| anyhow!("{} has no file name", source.display()))?;
    Ok(output_dir.join(format!("{}{}", prefix, name.to_string_lossy())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{DetectionResult, TypesetConfig};
    use crate::pipeline::fakes::FixedDetector;
    use crate::providers::ProviderKind;
    use crate::test_util::solid_rgb;
    use crate::translator::fakes::ScriptedProvider;
    use image::RgbImage;

    /// Cancels the batch from inside the first detection call.
    struct CancellingDetector {
        token: CancellationToken,
    }

    impl TextDetector for CancellingDetector {
        fn detect(&self, _image: &RgbImage) -> Result<Vec<DetectionResult>> {
            self.token.cancel();
            Ok(Vec::new())
        }
    }

    fn offline_pipeline<D: TextDetector>(detector: D) -> PagePipeline<D> {
        PagePipeline::new(
            detector,
            Translator::new(
                vec![Box::new(ScriptedProvider::failing(ProviderKind::Google))],
                "ja",
                "zh",
            ),
            Typesetter::estimated(TypesetConfig::default()),
        )
    }

    fn write_pages(dir: &Path, names: &[&str]) {
        for name in names {
            solid_rgb(32, 32, [255, 255, 255])
                .save(dir.join(name))
                .expect("save page");
        }
    }

    #[test]
    fn listing_filters_extensions_and_sorts_by_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b.PNG", "a.jpg", "c.webp", "notes.txt", "d.gif", "e.JPEG", "f.bmp"] {
            fs::write(dir.path().join(name), b"x").expect("write");
        }
        fs::create_dir(dir.path().join("nested.png")).expect("mkdir");
        let names: Vec<_> = list_input_images(dir.path())
            .expect("list")
            .iter()
            .map(|path| path.file_name().expect("name").to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.PNG", "c.webp", "e.JPEG", "f.bmp"]);
    }

    #[test]
    fn output_names_carry_the_prefix() {
        let path = output_path(Path::new("/out"), Path::new("/in/p01.jpg"), "trans_").expect("path");
        assert_eq!(path, PathBuf::from("/out/trans_p01.jpg"));
    }

    #[tokio::test]
    async fn every_input_gets_an_output() {
        let input = tempfile::tempdir().expect("input");
        let output = tempfile::tempdir().expect("output");
        write_pages(input.path(), &["p1.png", "p2.png"]);
        fs::write(input.path().join("p3.jpg"), b"not an image").expect("write");
        fs::write(input.path().join("readme.txt"), b"skip me").expect("write");

        let (sender, receiver) = unbounded();
        let out_dir = output.path().join("translated");
        let summary = run_batch(
            &offline_pipeline(FixedDetector::none()),
            input.path(),
            &out_dir,
            "trans_",
            &CancellationToken::new(),
            &sender,
        )
        .await
        .expect("batch");

        assert_eq!(summary.files_passed_through, 2);
        assert_eq!(summary.files_fallback_copied, 1);
        assert!(!summary.cancelled);
        for name in ["trans_p1.png", "trans_p2.png", "trans_p3.jpg"] {
            assert!(out_dir.join(name).exists(), "{name} missing");
        }
        assert!(!out_dir.join("trans_readme.txt").exists());

        let events: Vec<_> = receiver.try_iter().collect();
        assert_eq!(events.first(), Some(&BatchEvent::Started { total: 3 }));
        assert_eq!(events.last(), Some(&BatchEvent::Finished { summary }));
        let progress = events
            .iter()
            .filter(|event| matches!(event, BatchEvent::Progress { .. }))
            .count();
        assert_eq!(progress, 3);
    }

    #[tokio::test]
    async fn cancellation_stops_at_the_next_file_boundary() {
        let input = tempfile::tempdir().expect("input");
        let output = tempfile::tempdir().expect("output");
        write_pages(input.path(), &["p1.png", "p2.png", "p3.png"]);

        let token = CancellationToken::new();
        let detector = CancellingDetector {
            token: token.clone(),
        };
        let (sender, _receiver) = unbounded();
        let summary = run_batch(
            &offline_pipeline(detector),
            input.path(),
            output.path(),
            "trans_",
            &token,
            &sender,
        )
        .await
        .expect("batch");

        assert!(summary.cancelled);
        assert_eq!(summary.files_processed(), 1);
        assert!(output.path().join("trans_p1.png").exists());
        assert!(!output.path().join("trans_p2.png").exists());
    }

    #[test]
    fn detector_init_failure_aborts_before_any_file() {
        let input = tempfile::tempdir().expect("input");
        let output = tempfile::tempdir().expect("output");
        write_pages(input.path(), &["p1.png"]);

        let handle = spawn_batch_with(
            BatchRequest {
                input_dir: input.path().to_path_buf(),
                output_dir: output.path().join("out"),
                settings: Settings::default(),
            },
            |_settings| -> Result<FixedDetector> { Err(anyhow!("no OCR languages available")) },
        );
        let events: Vec<_> = handle.events.iter().collect();
        let err = handle.join().expect_err("init failure");
        assert!(format!("{:#}", err).contains("no OCR languages available"));
        assert!(events.iter().all(|event| matches!(event, BatchEvent::Log { .. })));
        assert!(!output.path().join("out").exists());
    }

    #[test]
    fn spawned_batch_reports_over_the_channel() {
        let input = tempfile::tempdir().expect("input");
        let output = tempfile::tempdir().expect("output");
        write_pages(input.path(), &["p1.png"]);

        let handle = spawn_batch_with(
            BatchRequest {
                input_dir: input.path().to_path_buf(),
                output_dir: output.path().to_path_buf(),
                settings: Settings::default(),
            },
            |_settings| Ok(FixedDetector::none()),
        );
        let events: Vec<_> = handle.events.iter().collect();
        let summary = handle.join().expect("batch");
        assert_eq!(summary.files_passed_through, 1);
        assert!(events.contains(&BatchEvent::Finished { summary }));
        assert!(output.path().join("trans_p1.png").exists());
    }

    #[test]
    fn summary_mentions_cancellation() {
        let summary = BatchSummary {
            files_typeset: 1,
            cancelled: true,
            ..BatchSummary::default()
        };
        assert_eq!(
            summary.to_string(),
            "1 file(s): 1 typeset, 0 unchanged, 0 copied after failure; 0 region(s) typeset, 0 skipped (cancelled)"
        );
    }
}
