//! Text completion backend.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion backend is not configured")]
    NotConfigured,

    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("completion backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion backend returned no text")]
    Empty,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Google Gemini `generateContent` client.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key: api_key.filter(|key| !key.is_empty()),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let Some(api_key) = &self.api_key else {
            return Err(CompletionError::NotConfigured);
        };

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        debug!(model = %self.model, prompt_len = prompt.len(), "Requesting completion");

        let res = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = res.json().await?;
        extract_text(&value).ok_or(CompletionError::Empty)
    }
}

/// Concatenated text parts of the first candidate.
pub fn extract_text(response: &Value) -> Option<String> {
    let parts = response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_candidate_text() {
        let response = json!({
            "candidates": [
                { "content": { "parts": [{ "text": "[beep] " }, { "text": "hello ta-da!" }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        });
        assert_eq!(extract_text(&response).as_deref(), Some("[beep] hello ta-da!"));
    }

    #[test]
    fn missing_or_blank_text_is_none() {
        assert_eq!(extract_text(&json!({})), None);
        assert_eq!(extract_text(&json!({ "candidates": [] })), None);
        let blank = json!({ "candidates": [{ "content": { "parts": [{ "text": "  " }] } }] });
        assert_eq!(extract_text(&blank), None);
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let client = GeminiClient::new(
            Some(String::new()),
            "gemini-1.5-flash",
            DEFAULT_GEMINI_BASE_URL,
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(matches!(
            client.complete("hi").await,
            Err(CompletionError::NotConfigured)
        ));
    }
}
