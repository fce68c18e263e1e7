//! Runtime events emitted by the pipeline for UI and observability.
//!
//! Events are small and cloneable so they can be broadcast without
//! blocking the speech path. Receivers that lag simply miss events.

use serde::Serialize;

use crate::pipeline::messages::{Epoch, Message};

/// Why a speech job was not played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Its epoch was superseded before playback started.
    Stale,
    /// Synthesis or playback failed.
    Failed,
}

/// Events that describe what the pipeline is doing "right now".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// A new response generation started (user message, idle prompt or interrupt).
    EpochStarted { epoch: Epoch },
    /// A message was appended to the chat log.
    MessageAppended { message: Message },
    /// Running transcript of the response currently being streamed.
    LiveTranscript { text: String },
    /// Whether a response is currently being generated.
    Processing { active: bool },
    /// The avatar's facial expression changed.
    Expression { name: String },
    /// Playback of one segment started.
    SpeechStarted { epoch: Epoch, text: String },
    /// Playback of one segment finished (or failed mid-way).
    SpeechFinished { epoch: Epoch, completed: bool },
    /// A queued job was skipped.
    SpeechJobDropped { epoch: Epoch, reason: DropReason },
    /// Mouth-open level in `[0, 1]` while audio plays.
    AssistantAudioLevel { volume: f32 },
    /// The idle producer acted on an event.
    LifeEvent { name: String },
}

impl RuntimeEvent {
    /// Stable dotted name used on the control bridge.
    pub fn name(&self) -> &'static str {
        match self {
            Self::EpochStarted { .. } => "pipeline.epoch_started",
            Self::MessageAppended { .. } => "chat.message",
            Self::LiveTranscript { .. } => "chat.transcript",
            Self::Processing { .. } => "chat.processing",
            Self::Expression { .. } => "avatar.expression",
            Self::SpeechStarted { .. } => "speech.started",
            Self::SpeechFinished { .. } => "speech.finished",
            Self::SpeechJobDropped { .. } => "speech.dropped",
            Self::AssistantAudioLevel { .. } => "avatar.audio_level",
            Self::LifeEvent { .. } => "life.event",
        }
    }
}
