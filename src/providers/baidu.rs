use anyhow::{anyhow, Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};

use super::retry::{is_rate_limited, send_with_backoff};
use super::{get_env, http_client, ProviderKind, TranslateFuture, TranslationProvider};

const ENDPOINT: &str = "https://fanyi-api.baidu.com/api/trans/vip/translate";
/// "Invalid Access Limit": too many requests per second for the account.
const RATE_LIMIT_ERROR: &str = "54003";

#[derive(Debug, Clone)]
pub struct Baidu {
    app_id: Option<String>,
    app_key: Option<String>,
    client: reqwest::Client,
}

impl Baidu {
    /// Credentials fall back to `BAIDU_APP_ID` / `BAIDU_APP_KEY`.
    pub fn new(app_id: Option<String>, app_key: Option<String>) -> Self {
        Self {
            app_id: app_id.or_else(|| get_env("BAIDU_APP_ID")),
            app_key: app_key.or_else(|| get_env("BAIDU_APP_KEY")),
            client: http_client(),
        }
    }

    async fn call(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let (Some(app_id), Some(app_key)) = (self.app_id.as_deref(), self.app_key.as_deref())
        else {
            return Err(anyhow!(
                "Baidu credentials missing (set translate.baidu_app_id/baidu_app_key or BAIDU_APP_ID/BAIDU_APP_KEY)"
            ));
        };
        let salt = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default()
            .to_string();
        let form = [
            ("q", text.to_string()),
            ("from", ProviderKind::Baidu.locale(source)),
            ("to", ProviderKind::Baidu.locale(target)),
            ("appid", app_id.to_string()),
            ("salt", salt.clone()),
            ("sign", sign(app_id, text, &salt, app_key)),
        ];
        let body = send_with_backoff(
            "Baidu",
            || self.client.post(ENDPOINT).form(&form),
            is_retryable,
        )
        .await?;
        parse_response(&body)
    }
}

impl TranslationProvider for Baidu {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Baidu
    }

    fn translate<'a>(&'a self, text: &'a str, source: &'a str, target: &'a str) -> TranslateFuture<'a> {
        Box::pin(self.call(text, source, target))
    }
}

/// `md5(appid + q + salt + key)` as lowercase hex.
fn sign(app_id: &str, text: &str, salt: &str, app_key: &str) -> String {
    let input = format!("{}{}{}{}", app_id, text, salt, app_key);
    format!("{:x}", md5::compute(input.as_bytes()))
}

fn is_retryable(status: StatusCode, body: &str) -> bool {
    is_rate_limited(status, body) || error_code(body).as_deref() == Some(RATE_LIMIT_ERROR)
}

#[derive(Debug, Deserialize)]
struct BaiduResponse {
    #[serde(default)]
    trans_result: Vec<BaiduResult>,
    error_code: Option<serde_json::Value>,
    error_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BaiduResult {
    dst: String,
}

fn error_code(body: &str) -> Option<String> {
    let parsed: BaiduResponse = serde_json::from_str(body).ok()?;
    parsed.error_code.map(|code| match code {
        serde_json::Value::String(value) => value,
        other => other.to_string(),
    })
}

fn parse_response(body: &str) -> Result<String> {
    let parsed: BaiduResponse =
        serde_json::from_str(body).with_context(|| "failed to parse Baidu response JSON")?;
    if let Some(code) = parsed.error_code {
        let code = match code {
            serde_json::Value::String(value) => value,
            other => other.to_string(),
        };
        if code != "52000" {
            return Err(anyhow!(
                "Baidu API error {}: {}",
                code,
                parsed.error_msg.unwrap_or_default()
            ));
        }
    }
    let lines: Vec<String> = parsed.trans_result.into_iter().map(|item| item.dst).collect();
    if lines.is_empty() {
        return Err(anyhow!("Baidu returned no translation"));
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_is_md5_of_the_concatenated_fields() {
        // md5("2015063000000001apple143566028812345678")
        assert_eq!(
            sign("2015063000000001", "apple", "1435660288", "12345678"),
            "f89f9594663708c1605f3d736d01d2d4"
        );
    }

    #[test]
    fn translation_lines_are_joined() {
        let body = r#"{"from":"jp","to":"zh","trans_result":[{"src":"こんにちは","dst":"你好"},{"src":"世界","dst":"世界"}]}"#;
        assert_eq!(parse_response(body).expect("parse"), "你好\n世界");
    }

    #[test]
    fn error_codes_become_errors() {
        let body = r#"{"error_code":"54001","error_msg":"Invalid Sign"}"#;
        let err = parse_response(body).expect_err("error");
        assert!(err.to_string().contains("54001"));
        assert!(err.to_string().contains("Invalid Sign"));
    }

    #[test]
    fn access_limit_is_retryable() {
        assert!(is_retryable(
            StatusCode::OK,
            r#"{"error_code":"54003","error_msg":"Invalid Access Limit"}"#
        ));
        assert!(is_retryable(StatusCode::OK, r#"{"error_code":54003}"#));
        assert!(!is_retryable(StatusCode::OK, r#"{"trans_result":[]}"#));
    }

    #[tokio::test]
    async fn missing_credentials_fail_fast() {
        let provider = Baidu {
            app_id: None,
            app_key: None,
            client: http_client(),
        };
        let err = provider
            .translate("こんにちは", "ja", "zh")
            .await
            .expect_err("no credentials");
        assert!(err.to_string().contains("credentials"));
    }
}
