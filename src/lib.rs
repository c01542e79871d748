use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

pub mod batch;
pub mod logging;
pub mod ocr;
pub mod pipeline;
pub mod providers;
pub mod settings;
#[cfg(test)]
mod test_util;
mod translator;

pub use batch::{spawn_batch, spawn_batch_with, BatchEvent, BatchHandle, BatchRequest, BatchSummary};
pub use pipeline::{FileOutcome, FileReport, PagePipeline, RegionError, RegionOutcome};
pub use providers::{ProviderKind, TranslationProvider};
pub use translator::{Translation, Translator};

#[derive(Debug, Clone)]
pub struct Config {
    pub input: PathBuf,
    pub output: PathBuf,
    pub source_lang: Option<String>,
    pub lang: Option<String>,
    pub providers: Vec<String>,
    pub settings_path: Option<String>,
}

/// Resolves settings for `config` and starts the batch.
pub fn start(config: Config) -> Result<BatchHandle> {
    let settings = resolve_settings(&config)?;
    if !config.input.is_dir() {
        return Err(anyhow!(
            "input directory does not exist: {}",
            config.input.display()
        ));
    }
    if same_dir(&config.input, &config.output) {
        return Err(anyhow!("output directory must differ from the input directory"));
    }
    Ok(spawn_batch(BatchRequest {
        input_dir: config.input,
        output_dir: config.output,
        settings,
    }))
}

fn resolve_settings(config: &Config) -> Result<settings::Settings> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    if let Some(lang) = non_empty(config.source_lang.as_deref()) {
        settings.source_lang = lang.to_string();
    }
    if let Some(lang) = non_empty(config.lang.as_deref()) {
        settings.target_lang = lang.to_string();
    }
    if !config.providers.is_empty() {
        settings.providers = settings::parse_provider_list(&config.providers)
            .with_context(|| "invalid --providers")?;
    }
    Ok(settings)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
