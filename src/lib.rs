//! Amica: streaming response-to-speech pipeline for an avatar chat companion.
//!
//! A user message is streamed through a language model, cut into tagged
//! sentences as text arrives, and each sentence is synthesized and played by
//! the avatar strictly in order:
//!
//! user text → LLM stream → segmenter → speech queue → TTS → avatar playback
//!
//! # Architecture
//!
//! - **Epochs**: every response runs under a counter; a newer message or an
//!   interrupt supersedes it and its queued speech is dropped unplayed
//! - **Segmenter**: `[emotion]` tags and sentence boundaries, independent of
//!   how the stream is chunked
//! - **Playback**: one consumer synthesizes and plays jobs one at a time
//! - **Life**: optional idle behaviour that speaks up when the user is quiet
//! - **Host**: newline-delimited JSON bridge for external control

pub mod audio;
pub mod avatar;
pub mod config;
pub mod emotion;
pub mod error;
pub mod host;
pub mod life;
pub mod llm;
pub mod pipeline;
pub mod runtime;
pub mod tts;

pub use config::ChatConfig;
pub use error::{ChatError, Result};
pub use pipeline::coordinator::ChatController;
pub use runtime::RuntimeEvent;
