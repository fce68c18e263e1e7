//! Avatar without a renderer: reports expressions and mouth levels as
//! runtime events and paces playback in real time.
//!
//! Front-ends subscribe to the runtime event stream and animate whatever
//! model they draw; the clip's audio output is theirs to handle.

use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{Avatar, PlaybackCompletion, SpeechAudio};
use crate::audio::{LipSyncEnvelope, decode_mono};
use crate::emotion::NEUTRAL_EXPRESSION;
use crate::error::{ChatError, Result};
use crate::runtime::RuntimeEvent;

/// Lip-sync frame rate.
const FRAMES_PER_SECOND: u32 = 60;

#[derive(Debug)]
pub struct HeadlessAvatar {
    runtime_tx: Option<broadcast::Sender<RuntimeEvent>>,
    expression: Mutex<String>,
}

impl HeadlessAvatar {
    pub fn new(runtime_tx: Option<broadcast::Sender<RuntimeEvent>>) -> Self {
        Self {
            runtime_tx,
            expression: Mutex::new(NEUTRAL_EXPRESSION.to_owned()),
        }
    }

    /// The last expression applied.
    pub fn expression(&self) -> String {
        match self.expression.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Avatar for HeadlessAvatar {
    fn set_expression(&self, expression: &str) {
        info!(expression, "avatar expression");
        match self.expression.lock() {
            Ok(mut guard) => *guard = expression.to_owned(),
            Err(poisoned) => *poisoned.into_inner() = expression.to_owned(),
        }
        if let Some(rt) = &self.runtime_tx {
            let _ = rt.send(RuntimeEvent::Expression {
                name: expression.to_owned(),
            });
        }
    }

    fn play(&self, speech: SpeechAudio) -> Result<PlaybackCompletion> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| ChatError::Playback(format!("no async runtime for playback: {e}")))?;
        let (signal, completion) = PlaybackCompletion::pair();
        let runtime_tx = self.runtime_tx.clone();

        handle.spawn(async move {
            let bytes = speech.audio.clone();
            let decoded = match tokio::task::spawn_blocking(move || decode_mono(&bytes)).await {
                Ok(Ok(decoded)) => decoded,
                Ok(Err(e)) => {
                    warn!(epoch = speech.epoch, "could not decode speech audio: {e}");
                    signal.fail(e);
                    return;
                }
                Err(e) => {
                    signal.fail(ChatError::Audio(format!("decode task failed: {e}")));
                    return;
                }
            };

            let envelope = LipSyncEnvelope::analyse(&decoded.samples, decoded.sample_rate, FRAMES_PER_SECOND);
            debug!(
                epoch = speech.epoch,
                seconds = decoded.duration_secs(),
                frames = envelope.levels.len(),
                "playing speech"
            );

            let mut ticker = tokio::time::interval(envelope.frame_duration());
            for &volume in &envelope.levels {
                ticker.tick().await;
                if let Some(rt) = &runtime_tx {
                    let _ = rt.send(RuntimeEvent::AssistantAudioLevel { volume });
                }
            }
            if let Some(rt) = &runtime_tx {
                let _ = rt.send(RuntimeEvent::AssistantAudioLevel { volume: 0.0 });
            }
            signal.finish();
        });

        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::io::Cursor;

    use bytes::Bytes;

    use super::*;
    use crate::emotion::Screenplay;
    use crate::pipeline::messages::Segment;

    fn short_wav() -> Bytes {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            // 50 ms of a loud square wave.
            for i in 0..400 {
                writer.write_sample(if i % 20 < 10 { 16_000i16 } else { -16_000 }).unwrap();
            }
            writer.finalize().unwrap();
        }
        Bytes::from(cursor.into_inner())
    }

    fn speech(audio: Bytes) -> SpeechAudio {
        SpeechAudio {
            audio,
            screenplay: Screenplay::from_segment(&Segment::new("happy", "Hi.")),
            epoch: 1,
        }
    }

    #[tokio::test]
    async fn expression_is_recorded_and_broadcast() {
        let (tx, mut rx) = broadcast::channel(8);
        let avatar = HeadlessAvatar::new(Some(tx));
        avatar.set_expression("happy");
        assert_eq!(avatar.expression(), "happy");
        assert_eq!(
            rx.recv().await.unwrap(),
            RuntimeEvent::Expression {
                name: "happy".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn playback_emits_levels_then_completes() {
        let (tx, mut rx) = broadcast::channel(64);
        let avatar = HeadlessAvatar::new(Some(tx));
        let completion = avatar.play(speech(short_wav())).unwrap();
        completion.wait().await.unwrap();

        let mut levels = Vec::new();
        while let Ok(RuntimeEvent::AssistantAudioLevel { volume }) = rx.try_recv() {
            levels.push(volume);
        }
        assert!(levels.len() >= 2);
        assert!(levels[0] > 0.9);
        assert_eq!(levels.last().copied(), Some(0.0));
    }

    #[tokio::test]
    async fn undecodable_audio_fails_completion() {
        let avatar = HeadlessAvatar::new(None);
        let completion = avatar.play(speech(Bytes::from_static(b"nope"))).unwrap();
        assert!(matches!(completion.wait().await, Err(ChatError::Audio(_))));
    }
}
