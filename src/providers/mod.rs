use anyhow::Result;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::warn;

use crate::settings::Settings;

mod baidu;
mod google;
mod openai;
pub(crate) mod retry;

pub use baidu::Baidu;
pub use google::Google;
pub use openai::OpenAI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProviderKind {
    Baidu,
    Google,
    OpenAI,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Baidu => "baidu",
            ProviderKind::Google => "google",
            ProviderKind::OpenAI => "openai",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "baidu" => Some(ProviderKind::Baidu),
            "google" => Some(ProviderKind::Google),
            "openai" => Some(ProviderKind::OpenAI),
            _ => None,
        }
    }

    /// Maps a generic language code to the code this provider expects.
    pub fn locale(&self, lang: &str) -> String {
        let lang = lang.trim();
        let mapped = match self {
            ProviderKind::Baidu => match lang {
                "ja" => "jp",
                "zh" | "zh-CN" => "zh",
                "zh-TW" => "cht",
                "ko" => "kor",
                "fr" => "fra",
                "es" => "spa",
                "vi" => "vie",
                other => other,
            },
            ProviderKind::Google => match lang {
                "zh" => "zh-CN",
                other => other,
            },
            ProviderKind::OpenAI => lang,
        };
        mapped.to_string()
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type TranslateFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// A machine-translation backend. `source` and `target` are generic codes
/// (`ja`, `zh`, ...); each provider maps them with [`ProviderKind::locale`].
pub trait TranslationProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;
    fn translate<'a>(&'a self, text: &'a str, source: &'a str, target: &'a str) -> TranslateFuture<'a>;
}

pub fn build_provider(kind: ProviderKind, settings: &Settings) -> Box<dyn TranslationProvider> {
    match kind {
        ProviderKind::Baidu => Box::new(Baidu::new(
            settings.baidu_app_id.clone(),
            settings.baidu_app_key.clone(),
        )),
        ProviderKind::Google => Box::new(Google::new()),
        ProviderKind::OpenAI => {
            let provider = OpenAI::new();
            match settings.openai_model.as_deref() {
                Some(model) => Box::new(provider.with_model(model)),
                None => Box::new(provider),
            }
        }
    }
}

/// Upper bound for one HTTP exchange, connect included.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub(crate) fn http_client() -> reqwest::Client {
    http_client_with_timeout(REQUEST_TIMEOUT)
}

fn http_client_with_timeout(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .unwrap_or_else(|err| {
            warn!("failed to build HTTP client with timeout: {}", err);
            reqwest::Client::new()
        })
}

pub(crate) fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
