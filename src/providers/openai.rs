use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::retry::{is_rate_limited, send_with_backoff};
use super::{get_env, http_client, ProviderKind, TranslateFuture, TranslationProvider};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";
const TOOL_NAME: &str = "deliver_translation";

#[derive(Debug, Clone)]
pub struct OpenAI {
    key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl OpenAI {
    /// The key comes from `OPENAI_API_KEY`.
    pub fn new() -> Self {
        Self {
            key: get_env("OPENAI_API_KEY"),
            model: DEFAULT_MODEL.to_string(),
            client: http_client(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    async fn call(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set"))?;
        let url = format!("{}/chat/completions", base_url());
        let body = chat_request_body(&self.model, text, source, target);
        let response = send_with_backoff(
            "OpenAI",
            || self.client.post(&url).bearer_auth(key).json(&body),
            is_rate_limited,
        )
        .await
        .map_err(|err| anyhow!(clean_error(&err.to_string())))?;
        Ok(extract_tool_response(&response, TOOL_NAME, &self.model)?.translation)
    }
}

impl Default for OpenAI {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslationProvider for OpenAI {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }

    fn translate<'a>(&'a self, text: &'a str, source: &'a str, target: &'a str) -> TranslateFuture<'a> {
        Box::pin(self.call(text, source, target))
    }
}

fn base_url() -> String {
    get_env("OPENAI_BASE_URL")
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

fn chat_request_body(model: &str, text: &str, source: &str, target: &str) -> serde_json::Value {
    let system = format!(
        "You translate speech-bubble text from a comic page. Translate from {} to {}. \
         Keep the tone of spoken dialogue, do not add notes, and reply only through the {} tool.",
        ProviderKind::OpenAI.locale(source),
        ProviderKind::OpenAI.locale(target),
        TOOL_NAME
    );
    json!({
        "model": model,
        "messages": [
            {"role": "system", "content": system},
            {"role": "user", "content": text}
        ],
        "tools": [
            {
                "type": "function",
                "function": {
                    "name": TOOL_NAME,
                    "description": "Return the translated text.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "translation": {"type": "string"}
                        },
                        "required": ["translation"]
                    }
                }
            }
        ],
        "tool_choice": {"type": "function", "function": {"name": TOOL_NAME}}
    })
}

#[derive(Debug, Clone, Serialize)]
struct ToolResponse {
    translation: String,
    model: String,
}

fn extract_tool_response(text: &str, tool_name: &str, fallback_model: &str) -> Result<ToolResponse> {
    let payload: OpenAIResponse =
        serde_json::from_str(text).with_context(|| "failed to parse OpenAI response JSON")?;
    let tool_call = payload
        .choices
        .first()
        .and_then(|choice| choice.message.tool_calls.first())
        .ok_or_else(|| anyhow!("no tool call returned from OpenAI"))?;

    if tool_call.function.name != tool_name {
        return Err(anyhow!(
            "unexpected tool name '{}' from OpenAI",
            tool_call.function.name
        ));
    }

    let args: ToolArgs = serde_json::from_str(&tool_call.function.arguments)
        .with_context(|| "failed to parse OpenAI tool arguments")?;
    let model = payload
        .model
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| fallback_model.to_string());
    Ok(ToolResponse {
        translation: args.translation,
        model,
    })
}

/// Replaces a raw JSON error body with its message/type/code parts.
fn clean_error(raw: &str) -> String {
    let Some(start) = raw.find('{') else {
        return raw.to_string();
    };
    match extract_openai_error(&raw[start..]) {
        Some(message) => format!("{}{}", &raw[..start], message),
        None => raw.to_string(),
    }
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    Some(format_error_parts(error.message, error.kind, error.code))
}

fn format_error_parts(
    message: Option<String>,
    kind: Option<String>,
    code: Option<String>,
) -> String {
    let parts: Vec<String> = [
        message,
        kind.map(|kind| format!("type: {}", kind)),
        code.map(|code| format!("code: {}", code)),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.trim().is_empty() && !part.ends_with(": "))
    .collect();
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(" | ")
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    model: Option<String>,
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    tool_calls: Vec<OpenAIToolCall>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    function: OpenAIFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ToolArgs {
    translation: String,
}
