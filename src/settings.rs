use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::providers::ProviderKind;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub source_lang: String,
    pub target_lang: String,
    pub output_prefix: String,
    pub providers: Vec<ProviderKind>,
    pub baidu_app_id: Option<String>,
    pub baidu_app_key: Option<String>,
    pub openai_model: Option<String>,
    pub ocr_languages: String,
    pub paragraph_x_ths: f32,
    pub paragraph_y_ths: f32,
    pub min_size: u32,
    pub font_path: Option<String>,
    pub max_font_size: u32,
    pub min_font_size: u32,
    pub font_size_step: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_lang: "ja".to_string(),
            target_lang: "zh".to_string(),
            output_prefix: "trans_".to_string(),
            providers: vec![ProviderKind::Baidu, ProviderKind::Google],
            baidu_app_id: None,
            baidu_app_key: None,
            openai_model: None,
            ocr_languages: "jpn+eng".to_string(),
            paragraph_x_ths: 0.8,
            paragraph_y_ths: 0.5,
            min_size: 10,
            font_path: None,
            max_font_size: 40,
            min_font_size: 10,
            font_size_step: 2,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    system: Option<SystemSettings>,
    translate: Option<TranslateSettings>,
    ocr: Option<OcrSettings>,
    typeset: Option<TypesetSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct SystemSettings {
    source_lang: Option<String>,
    target_lang: Option<String>,
    output_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslateSettings {
    providers: Option<Vec<String>>,
    baidu_app_id: Option<String>,
    baidu_app_key: Option<String>,
    openai_model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    languages: Option<String>,
    paragraph_x_ths: Option<f32>,
    paragraph_y_ths: Option<f32>,
    min_size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct TypesetSettings {
    font_path: Option<String>,
    max_font_size: Option<u32>,
    min_font_size: Option<u32>,
    font_size_step: Option<u32>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed)?;
        }
    }

    settings.validate()?;
    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) -> Result<()> {
        if let Some(system) = incoming.system {
            if let Some(lang) = non_empty(system.source_lang) {
                self.source_lang = lang;
            }
            if let Some(lang) = non_empty(system.target_lang) {
                self.target_lang = lang;
            }
            if let Some(prefix) = system.output_prefix {
                self.output_prefix = prefix;
            }
        }
        if let Some(translate) = incoming.translate {
            if let Some(names) = translate.providers {
                if !names.is_empty() {
                    self.providers = parse_provider_list(&names)?;
                }
            }
            if let Some(app_id) = non_empty(translate.baidu_app_id) {
                self.baidu_app_id = Some(app_id);
            }
            if let Some(app_key) = non_empty(translate.baidu_app_key) {
                self.baidu_app_key = Some(app_key);
            }
            if let Some(model) = non_empty(translate.openai_model) {
                self.openai_model = Some(model);
            }
        }
        if let Some(ocr) = incoming.ocr {
            if let Some(languages) = non_empty(ocr.languages) {
                self.ocr_languages = languages;
            }
            if let Some(value) = ocr.paragraph_x_ths {
                if value > 0.0 {
                    self.paragraph_x_ths = value;
                }
            }
            if let Some(value) = ocr.paragraph_y_ths {
                if value > 0.0 {
                    self.paragraph_y_ths = value;
                }
            }
            if let Some(value) = ocr.min_size {
                self.min_size = value;
            }
        }
        if let Some(typeset) = incoming.typeset {
            if let Some(path) = non_empty(typeset.font_path) {
                self.font_path = Some(path);
            }
            if let Some(size) = typeset.max_font_size {
                if size > 0 {
                    self.max_font_size = size;
                }
            }
            if let Some(size) = typeset.min_font_size {
                if size > 0 {
                    self.min_font_size = size;
                }
            }
            if let Some(step) = typeset.font_size_step {
                if step > 0 {
                    self.font_size_step = step;
                }
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.min_font_size > self.max_font_size {
            return Err(anyhow!(
                "typeset.min_font_size ({}) is larger than typeset.max_font_size ({})",
                self.min_font_size,
                self.max_font_size
            ));
        }
        if self.providers.is_empty() {
            return Err(anyhow!("translate.providers is empty"));
        }
        Ok(())
    }
}

pub fn parse_provider_list(names: &[String]) -> Result<Vec<ProviderKind>> {
    let mut providers = Vec::new();
    for name in names {
        let kind = ProviderKind::from_name(name)
            .ok_or_else(|| anyhow!("unknown translation provider '{}'", name.trim()))?;
        if !providers.contains(&kind) {
            providers.push(kind);
        }
    }
    Ok(providers)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".comic-translator-rust"))
        }
    })
}
