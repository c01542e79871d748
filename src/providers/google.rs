use anyhow::{anyhow, Context, Result};

use super::retry::{is_rate_limited, send_with_backoff};
use super::{http_client, ProviderKind, TranslateFuture, TranslationProvider};

const ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

/// Keyless web endpoint used by the Google Translate widgets.
#[derive(Debug, Clone)]
pub struct Google {
    client: reqwest::Client,
}

impl Google {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }

    async fn call(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let query = [
            ("client", "gtx".to_string()),
            ("sl", ProviderKind::Google.locale(source)),
            ("tl", ProviderKind::Google.locale(target)),
            ("dt", "t".to_string()),
            ("q", text.to_string()),
        ];
        let body = send_with_backoff(
            "Google",
            || self.client.get(ENDPOINT).query(&query),
            is_rate_limited,
        )
        .await?;
        parse_response(&body)
    }
}

impl Default for Google {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslationProvider for Google {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn translate<'a>(&'a self, text: &'a str, source: &'a str, target: &'a str) -> TranslateFuture<'a> {
        Box::pin(self.call(text, source, target))
    }
}

/// The response is a nested array; `[0]` holds one `[translated, source, ..]`
/// entry per sentence.
fn parse_response(body: &str) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_str(body).with_context(|| "failed to parse Google response JSON")?;
    let sentences = value
        .get(0)
        .and_then(|item| item.as_array())
        .ok_or_else(|| anyhow!("unexpected Google response shape"))?;
    let text: String = sentences
        .iter()
        .filter_map(|sentence| sentence.get(0).and_then(|part| part.as_str()))
        .collect();
    if text.trim().is_empty() {
        return Err(anyhow!("Google returned no translation"));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentences_are_concatenated() {
        let body = r#"[[["你好。","こんにちは。",null,null,10],["世界","世界",null,null,10]],null,"ja"]"#;
        assert_eq!(parse_response(body).expect("parse"), "你好。世界");
    }

    #[test]
    fn unexpected_shapes_are_errors() {
        assert!(parse_response(r#"{"error":"nope"}"#).is_err());
        assert!(parse_response(r#"[null,null,"ja"]"#).is_err());
        assert!(parse_response(r#"[[],null,"ja"]"#).is_err());
        assert!(parse_response("<html>").is_err());
    }
}
