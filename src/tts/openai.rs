//! OpenAI-compatible `/v1/audio/speech` synthesis.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::VoiceBackend;
use crate::error::{ChatError, Result};
use crate::llm::{extract_error_message, http_client};

#[derive(Debug, Clone)]
pub struct OpenAiVoice {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
}

impl OpenAiVoice {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, api_key: impl Into<String>, model: &str, voice: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            model: model.to_owned(),
            voice: voice.to_owned(),
        })
    }
}

#[async_trait]
impl VoiceBackend for OpenAiVoice {
    fn name(&self) -> &str {
        "openai"
    }

    async fn synthesize(&self, text: &str) -> Result<Bytes> {
        let url = format!("{}/v1/audio/speech", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
        });
        debug!(%url, chars = text.chars().count(), "requesting speech");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Tts(format!("OpenAI TTS request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Tts(format!(
                "OpenAI TTS HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body)
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| ChatError::Tts(format!("OpenAI TTS body read failed: {e}")))
    }
}
