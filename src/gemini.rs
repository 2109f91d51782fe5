use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;

use crate::generate::{GenerateError, SafetyConfig, TextGenerator};

pub fn generate_content_endpoint(base_url: &str, model: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/models/{model}:generateContent")
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build gemini http client")?;
        Ok(Self {
            client,
            endpoint: generate_content_endpoint(base_url, model),
            api_key,
        })
    }

    pub fn from_env(base_url: &str, model: &str, timeout: Duration) -> anyhow::Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY is not set"))?;
        Self::new(base_url, model, api_key, timeout)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str, safety: &SafetyConfig) -> Result<String, GenerateError> {
        let body = serde_json::json!({
            "contents": [
                { "role": "user", "parts": [ { "text": prompt } ] }
            ],
            "safetySettings": safety.settings,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| GenerateError::Transport(format!("POST {}: {err}", self.endpoint)))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|err| GenerateError::Transport(format!("read gemini response body: {err}")))?;

        if !status.is_success() {
            return Err(classify_error_response(status.as_u16(), &raw));
        }

        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|err| GenerateError::Transport(format!("parse gemini response: {err}")))?;
        extract_candidate_text(&value)
    }
}

fn classify_error_response(status: u16, raw_json: &str) -> GenerateError {
    let (api_status, message) = parse_error(raw_json).unwrap_or_else(|| (None, raw_json.to_owned()));
    if status == 429 || api_status.as_deref() == Some("RESOURCE_EXHAUSTED") {
        return GenerateError::RateLimited(message);
    }
    GenerateError::Api { status, message }
}

fn parse_error(raw_json: &str) -> Option<(Option<String>, String)> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let error = value.get("error")?;
    let message = error.get("message")?.as_str()?.to_owned();
    let status = error
        .get("status")
        .and_then(|v| v.as_str())
        .map(str::to_owned);
    Some((status, message))
}

const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "RECITATION",
];

fn extract_candidate_text(value: &serde_json::Value) -> Result<String, GenerateError> {
    if let Some(reason) = value
        .pointer("/promptFeedback/blockReason")
        .and_then(|v| v.as_str())
    {
        return Err(GenerateError::Blocked(format!("prompt blocked: {reason}")));
    }

    let Some(candidate) = value
        .get("candidates")
        .and_then(|v| v.as_array())
        .and_then(|candidates| candidates.first())
    else {
        return Err(GenerateError::Empty);
    };

    let mut text = String::new();
    if let Some(parts) = candidate.pointer("/content/parts").and_then(|v| v.as_array()) {
        for part in parts {
            let Some(part_text) = part.get("text").and_then(|v| v.as_str()) else {
                continue;
            };
            text.push_str(part_text);
        }
    }

    if !text.trim().is_empty() {
        return Ok(text);
    }

    match candidate.get("finishReason").and_then(|v| v.as_str()) {
        Some(reason) if BLOCKING_FINISH_REASONS.contains(&reason) => {
            Err(GenerateError::Blocked(format!("finish reason: {reason}")))
        }
        _ => Err(GenerateError::Empty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_and_model() {
        assert_eq!(
            generate_content_endpoint("http://127.0.0.1:1/v1beta/", "gemini-1.5-flash"),
            "http://127.0.0.1:1/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn candidate_parts_are_concatenated() {
        let value = serde_json::json!({
            "candidates": [{
                "content": { "parts": [ { "text": "สวัสดี" }, { "text": " ครับ" } ] },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(extract_candidate_text(&value), Ok("สวัสดี ครับ".to_owned()));
    }

    #[test]
    fn prompt_block_reason_is_blocked() {
        let value = serde_json::json!({ "promptFeedback": { "blockReason": "OTHER" } });
        assert!(matches!(
            extract_candidate_text(&value),
            Err(GenerateError::Blocked(_))
        ));
    }

    #[test]
    fn safety_finish_without_text_is_blocked_not_empty() {
        let value = serde_json::json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        });
        assert!(matches!(
            extract_candidate_text(&value),
            Err(GenerateError::Blocked(_))
        ));
    }

    #[test]
    fn whitespace_output_is_empty() {
        let value = serde_json::json!({
            "candidates": [{
                "content": { "parts": [ { "text": "  \n" } ] },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(extract_candidate_text(&value), Err(GenerateError::Empty));
        assert_eq!(
            extract_candidate_text(&serde_json::json!({})),
            Err(GenerateError::Empty)
        );
    }

    #[test]
    fn quota_errors_are_rate_limited() {
        let raw = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            classify_error_response(429, raw),
            GenerateError::RateLimited("Quota exceeded".to_owned())
        );
        assert!(matches!(
            classify_error_response(400, raw),
            GenerateError::RateLimited(_)
        ));
    }

    #[test]
    fn other_errors_keep_status_and_message() {
        let raw = r#"{"error":{"code":403,"message":"API key not valid","status":"PERMISSION_DENIED"}}"#;
        assert_eq!(
            classify_error_response(403, raw),
            GenerateError::Api {
                status: 403,
                message: "API key not valid".to_owned(),
            }
        );
        assert_eq!(
            classify_error_response(502, "bad gateway"),
            GenerateError::Api {
                status: 502,
                message: "bad gateway".to_owned(),
            }
        );
    }
}
