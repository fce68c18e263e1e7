//! Error types for the amica response pipeline.

/// Top-level error type for the chat-to-speech system.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Language model request or stream error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Text-to-speech synthesis error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio decoding error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Avatar refused or failed playback.
    #[error("playback error: {0}")]
    Playback(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// Control bridge protocol error.
    #[error("host error: {0}")]
    Host(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ChatError>;
