//! Text-to-speech backends.
//!
//! A backend turns one cleaned sentence into encoded audio (MP3, WAV, ...).
//! Decoding and playback are the avatar's business.

pub mod clean;
pub mod elevenlabs;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::{TtsBackend, TtsConfig};
use crate::error::{ChatError, Result};

pub use clean::speakable_text;
pub use elevenlabs::ElevenLabsVoice;
pub use openai::OpenAiVoice;

/// A speech synthesizer.
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Synthesize `text`. An empty result means "nothing to play".
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Tts`] when the provider fails.
    async fn synthesize(&self, text: &str) -> Result<Bytes>;
}

/// Silent backend: every sentence produces no audio.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVoice;

#[async_trait]
impl VoiceBackend for NoVoice {
    fn name(&self) -> &str {
        "none"
    }

    async fn synthesize(&self, _text: &str) -> Result<Bytes> {
        Ok(Bytes::new())
    }
}

/// Build the voice backend selected in `tts`.
///
/// # Errors
///
/// Returns [`ChatError::Config`] when a cloud backend has no API key.
pub fn create_voice_backend(tts: &TtsConfig) -> Result<Arc<dyn VoiceBackend>> {
    let backend: Arc<dyn VoiceBackend> = match tts.backend {
        TtsBackend::None => Arc::new(NoVoice),
        TtsBackend::OpenAi => {
            let api_key = tts.resolved_openai_key().ok_or_else(|| {
                ChatError::Config("OpenAI TTS selected but no API key configured".to_owned())
            })?;
            Arc::new(OpenAiVoice::new(
                &tts.openai_url,
                api_key,
                &tts.openai_model,
                &tts.openai_voice,
            )?)
        }
        TtsBackend::ElevenLabs => {
            let api_key = tts.resolved_elevenlabs_key().ok_or_else(|| {
                ChatError::Config("ElevenLabs TTS selected but no API key configured".to_owned())
            })?;
            Arc::new(ElevenLabsVoice::new(
                &tts.elevenlabs_url,
                api_key,
                &tts.elevenlabs_voice_id,
                &tts.elevenlabs_model,
            )?)
        }
    };
    Ok(backend)
}
