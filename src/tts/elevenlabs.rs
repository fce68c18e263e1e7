//! ElevenLabs text-to-speech.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::VoiceBackend;
use crate::error::{ChatError, Result};
use crate::llm::{extract_error_message, http_client};

#[derive(Debug, Clone)]
pub struct ElevenLabsVoice {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    voice_id: String,
    model: String,
}

impl ElevenLabsVoice {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, api_key: impl Into<String>, voice_id: &str, model: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            voice_id: voice_id.to_owned(),
            model: model.to_owned(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}?optimize_streaming_latency=0&output_format=mp3_44100_128",
            self.base_url, self.voice_id
        )
    }
}

#[async_trait]
impl VoiceBackend for ElevenLabsVoice {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    async fn synthesize(&self, text: &str) -> Result<Bytes> {
        let body = serde_json::json!({
            "text": text,
            "model_id": self.model,
            "voice_settings": {
                "stability": 0,
                "similarity_boost": 0,
                "style": 0,
                "use_speaker_boost": true,
            },
        });
        debug!(voice_id = %self.voice_id, chars = text.chars().count(), "requesting speech");

        let response = self
            .client
            .post(self.endpoint())
            .header("xi-api-key", &self.api_key)
            .header("accept", "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Tts(format!("ElevenLabs request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Tts(format!(
                "ElevenLabs HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body)
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| ChatError::Tts(format!("ElevenLabs body read failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn endpoint_requests_mp3() {
        let voice = ElevenLabsVoice::new("https://api.elevenlabs.io/", "k", "abc", "m").unwrap();
        assert_eq!(
            voice.endpoint(),
            "https://api.elevenlabs.io/v1/text-to-speech/abc?optimize_streaming_latency=0&output_format=mp3_44100_128"
        );
    }
}
