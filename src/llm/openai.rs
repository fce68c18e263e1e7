//! OpenAI-compatible chat completions adapter.
//!
//! Works with OpenAI and any server exposing `/v1/chat/completions` with
//! SSE streaming (vLLM, LM Studio, OpenRouter, ...).

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::stream::{Delta, Framing, decode_text_stream};
use super::{ChatBackend, TextStream, extract_error_message, http_client};
use crate::error::{ChatError, Result};
use crate::pipeline::messages::Message;

/// Streaming chat completions client.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
}

impl OpenAiBackend {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, model: &str, api_key: impl Into<String>, max_tokens: u32) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_owned(),
            model: model.to_owned(),
            api_key: api_key.into(),
            max_tokens,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn build_body(&self, messages: &[Message]) -> Value {
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
            "max_tokens": self.max_tokens,
        })
    }

    fn map_http_error(status: reqwest::StatusCode, body: &str) -> ChatError {
        let message = extract_error_message(body);
        match status.as_u16() {
            401 => ChatError::Llm(format!("invalid OpenAI authentication: {message}")),
            429 => ChatError::Llm(format!("OpenAI rate limited: {message}")),
            code => ChatError::Llm(format!("OpenAI HTTP {code}: {message}")),
        }
    }
}

/// Pull `choices[0].delta.content` out of one streamed chunk.
fn parse_chunk(data: &str) -> Result<Delta> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| ChatError::Llm(format!("invalid OpenAI stream chunk: {e}")))?;
    if let Some(error) = value.get("error") {
        return Err(ChatError::Llm(extract_error_message(&error.to_string())));
    }
    let text = value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Ok(Delta::text(text))
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn send(&self, messages: &[Message]) -> Result<TextStream> {
        let url = self.endpoint();
        debug!(%url, model = %self.model, messages = messages.len(), "opening chat completion stream");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.build_body(messages))
            .send()
            .await
            .map_err(|e| ChatError::Llm(format!("OpenAI request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body));
        }

        Ok(decode_text_stream(
            response.bytes_stream(),
            Framing::Sse,
            "OpenAI",
            parse_chunk,
        ))
    }
}
