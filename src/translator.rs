use serde::Serialize;
use tracing::{debug, warn};

use crate::providers::{build_provider, ProviderKind, TranslationProvider};
use crate::settings::Settings;

/// Tries each provider in order and falls back to the source text when all
/// of them fail. The source language is fixed rather than detected.
pub struct Translator {
    providers: Vec<Box<dyn TranslationProvider>>,
    source_lang: String,
    target_lang: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Translation {
    pub text: String,
    /// `None` when the text is the untranslated input.
    pub provider: Option<ProviderKind>,
}

impl Translator {
    pub fn new(
        providers: Vec<Box<dyn TranslationProvider>>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            providers,
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let providers = settings
            .providers
            .iter()
            .map(|kind| build_provider(*kind, settings))
            .collect();
        Self::new(providers, &settings.source_lang, &settings.target_lang)
    }

    pub fn source_lang(&self) -> &str {
        &self.source_lang
    }

    pub fn target_lang(&self) -> &str {
        &self.target_lang
    }

    pub async fn translate(&self, text: &str) -> Translation {
        let text = text.trim();
        if text.is_empty() {
            return identity(text);
        }
        for provider in &self.providers {
            let kind = provider.kind();
            match provider
                .translate(text, &self.source_lang, &self.target_lang)
                .await
            {
                Ok(translated) if !translated.trim().is_empty() => {
                    debug!("{} translated {:?} -> {:?}", kind, text, translated);
                    return Translation {
                        text: translated.trim().to_string(),
                        provider: Some(kind),
                    };
                }
                Ok(_) => warn!("{} returned an empty translation", kind),
                Err(err) => warn!("{} translation failed: {:#}", kind, err),
            }
        }
        warn!("all translation providers failed; keeping source text");
        identity(text)
    }
}

fn identity(text: &str) -> Translation {
    Translation {
        text: text.to_string(),
        provider: None,
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::ScriptedProvider;
    use super::*;

    #[tokio::test]
    async fn primary_success_skips_the_fallback() {
        let fallback = ScriptedProvider::replying(ProviderKind::Google, "谷歌");
        let calls = fallback.calls.clone();
        let translator = Translator::new(
            vec![
                Box::new(ScriptedProvider::replying(ProviderKind::Baidu, "你好")),
                Box::new(fallback),
            ],
            "ja",
            "zh",
        );
        let translation = translator.translate("こんにちは").await;
        assert_eq!(
            translation,
            Translation {
                text: "你好".to_string(),
                provider: Some(ProviderKind::Baidu)
            }
        );
        assert!(calls.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn fallback_is_used_when_primary_fails() {
        let translator = Translator::new(
            vec![
                Box::new(ScriptedProvider::failing(ProviderKind::Baidu)),
                Box::new(ScriptedProvider::replying(ProviderKind::Google, " 你好 ")),
            ],
            "ja",
            "zh",
        );
        let translation = translator.translate("こんにちは").await;
        assert_eq!(translation.text, "你好");
        assert_eq!(translation.provider, Some(ProviderKind::Google));
    }

    #[tokio::test]
    async fn total_failure_returns_the_source_text() {
        let translator = Translator::new(
            vec![
                Box::new(ScriptedProvider::failing(ProviderKind::Baidu)),
                Box::new(ScriptedProvider::failing(ProviderKind::Google)),
            ],
            "ja",
            "zh",
        );
        for _ in 0..3 {
            let translation = translator.translate("こんにちは").await;
            assert_eq!(translation, identity("こんにちは"));
        }
    }

    #[tokio::test]
    async fn empty_replies_count_as_failures() {
        let translator = Translator::new(
            vec![Box::new(ScriptedProvider::replying(ProviderKind::Google, "  "))],
            "ja",
            "zh",
        );
        assert_eq!(translator.translate("はい").await.provider, None);
    }

    #[tokio::test]
    async fn source_language_is_pinned() {
        let provider = ScriptedProvider::failing(ProviderKind::Baidu);
        let calls = provider.calls.clone();
        let translator = Translator::new(vec![Box::new(provider)], "ja", "zh");
        translator.translate(" 漢字だけ ").await;
        let calls = calls.lock().expect("lock");
        assert_eq!(
            calls.as_slice(),
            &[("漢字だけ".to_string(), "ja".to_string(), "zh".to_string())]
        );
    }

    #[tokio::test]
    async fn blank_text_never_reaches_providers() {
        let provider = ScriptedProvider::replying(ProviderKind::Google, "x");
        let calls = provider.calls.clone();
        let translator = Translator::new(vec![Box::new(provider)], "ja", "zh");
        assert_eq!(translator.translate("   ").await, identity(""));
        assert!(calls.lock().expect("lock").is_empty());
    }

    #[test]
    fn settings_order_is_provider_order() {
        let settings = Settings {
            providers: vec![ProviderKind::Google, ProviderKind::Baidu],
            ..Settings::default()
        };
        let translator = Translator::from_settings(&settings);
        let kinds: Vec<_> = translator.providers.iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, vec![ProviderKind::Google, ProviderKind::Baidu]);
        assert_eq!(translator.source_lang(), "ja");
        assert_eq!(translator.target_lang(), "zh");
    }
}
