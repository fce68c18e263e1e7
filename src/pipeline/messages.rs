//! Message types passed between pipeline stages.

use serde::{Deserialize, Serialize};

/// Monotonically increasing response generation counter.
///
/// `0` means no response has been started yet.
pub type Epoch = u64;

/// Who authored a chat log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A speakable unit cut out of a streamed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Emotion tag that preceded this segment, empty when there was none.
    pub tag: String,
    /// Sentence text with bracket tags removed.
    pub text: String,
}

impl Segment {
    pub fn new(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            text: text.into(),
        }
    }
}

/// A segment waiting in the speech queue, stamped with the epoch that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechJob {
    pub segment: Segment,
    pub epoch: Epoch,
}

impl SpeechJob {
    pub fn new(segment: Segment, epoch: Epoch) -> Self {
        Self { segment, epoch }
    }
}
