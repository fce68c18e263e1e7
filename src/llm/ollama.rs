//! Ollama `/api/generate` adapter (newline-delimited JSON stream).

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::prompt::build_prompt;
use super::stream::{Delta, Framing, decode_text_stream};
use super::{ChatBackend, TextStream, extract_error_message, http_client};
use crate::error::{ChatError, Result};
use crate::pipeline::messages::Message;

#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    character_name: String,
}

impl OllamaBackend {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, model: &str, character_name: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_owned(),
            model: model.to_owned(),
            character_name: character_name.to_owned(),
        })
    }
}

fn parse_line(line: &str) -> Result<Delta> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| ChatError::Llm(format!("invalid Ollama stream line: {e}")))?;
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Err(ChatError::Llm(format!("Ollama error: {error}")));
    }
    Ok(Delta {
        text: value
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        done: value.get("done").and_then(Value::as_bool).unwrap_or(false),
    })
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn send(&self, messages: &[Message]) -> Result<TextStream> {
        let url = format!("{}/api/generate", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": build_prompt(messages, &self.character_name),
        });
        debug!(%url, model = %self.model, "opening Ollama generate stream");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Llm(format!("Ollama request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Llm(format!(
                "Ollama HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body)
            )));
        }

        Ok(decode_text_stream(
            response.bytes_stream(),
            Framing::Ndjson,
            "Ollama",
            parse_line,
        ))
    }
}
