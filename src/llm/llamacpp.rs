//! llama.cpp server `/completion` adapter (SSE stream).

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::prompt::build_prompt;
use super::stream::{Delta, Framing, decode_text_stream};
use super::{ChatBackend, TextStream, extract_error_message, http_client};
use crate::error::{ChatError, Result};
use crate::pipeline::messages::Message;

#[derive(Debug, Clone)]
pub struct LlamaCppBackend {
    client: reqwest::Client,
    base_url: String,
    character_name: String,
    n_predict: u32,
    temperature: f32,
}

impl LlamaCppBackend {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, character_name: &str, n_predict: u32, temperature: f32) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_owned(),
            character_name: character_name.to_owned(),
            n_predict,
            temperature,
        })
    }

    fn build_body(&self, messages: &[Message]) -> Value {
        serde_json::json!({
            "stream": true,
            "n_predict": self.n_predict,
            "temperature": self.temperature,
            "cache_prompt": true,
            // Stop before the model starts writing the next turn itself.
            "stop": ["</s>", format!("{}:", self.character_name), "User:"],
            "prompt": build_prompt(messages, &self.character_name),
        })
    }
}

fn parse_event(data: &str) -> Result<Delta> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| ChatError::Llm(format!("invalid llama.cpp stream event: {e}")))?;
    Ok(Delta {
        text: value
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        done: value.get("stop").and_then(Value::as_bool).unwrap_or(false),
    })
}

#[async_trait]
impl ChatBackend for LlamaCppBackend {
    fn name(&self) -> &str {
        "llamacpp"
    }

    async fn send(&self, messages: &[Message]) -> Result<TextStream> {
        let url = format!("{}/completion", self.base_url);
        debug!(%url, "opening llama.cpp completion stream");

        let response = self
            .client
            .post(&url)
            .json(&self.build_body(messages))
            .send()
            .await
            .map_err(|e| ChatError::Llm(format!("llama.cpp request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Llm(format!(
                "llama.cpp HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body)
            )));
        }

        Ok(decode_text_stream(
            response.bytes_stream(),
            Framing::Sse,
            "llama.cpp",
            parse_event,
        ))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn body_stops_on_turn_markers() {
        let backend = LlamaCppBackend::new("http://127.0.0.1:8080/", "Amica", 400, 0.7).unwrap();
        let body = backend.build_body(&[Message::user("hi")]);
        assert_eq!(body["stop"], serde_json::json!(["</s>", "Amica:", "User:"]));
        assert_eq!(body["n_predict"], 400);
        assert_eq!(body["cache_prompt"], true);
        assert_eq!(body["prompt"], "User: hi\nAmica:");
    }

    #[test]
    fn parse_content_and_stop() {
        assert_eq!(parse_event(r#"{"content":" there","stop":false}"#).unwrap(), Delta::text(" there"));
        assert!(parse_event(r#"{"content":"","stop":true}"#).unwrap().done);
    }
}
