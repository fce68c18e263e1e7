//! Emotion vocabulary and the screenplay derived from each segment.
//!
//! The model prefixes sentences with tags such as `[happy]`. A tag naming
//! one of [`EMOTIONS`] switches the avatar's facial expression; any other tag
//! leaves the current expression in place.

use serde::Serialize;

use crate::pipeline::messages::Segment;

/// Expressions every avatar is expected to support.
pub const EMOTIONS: &[&str] = &["neutral", "happy", "angry", "sad", "relaxed", "surprised"];

/// Expression applied when the character falls asleep.
pub const SLEEP_EXPRESSION: &str = "Sleep";

/// Expression applied when the character wakes up.
pub const NEUTRAL_EXPRESSION: &str = "neutral";

/// Returns `true` if `tag` names one of [`EMOTIONS`] (case-insensitive).
pub fn is_known_emotion(tag: &str) -> bool {
    canonical_emotion(tag).is_some()
}

/// The [`EMOTIONS`] entry `tag` names, ignoring case and surrounding space.
pub fn canonical_emotion(tag: &str) -> Option<&'static str> {
    let tag = tag.trim();
    EMOTIONS.iter().copied().find(|e| e.eq_ignore_ascii_case(tag))
}

/// What the avatar should do for one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Screenplay {
    /// Expression to apply before speaking, `None` to keep the current one.
    pub expression: Option<String>,
    /// Displayed sentence text.
    pub message: String,
}

impl Screenplay {
    pub fn from_segment(segment: &Segment) -> Self {
        let expression = canonical_emotion(&segment.tag).map(str::to_owned);
        Self {
            expression,
            message: segment.text.clone(),
        }
    }
}
