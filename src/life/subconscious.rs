//! Reflection on the recent conversation, kept as a bounded diary.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::LifeHost;
use crate::emotion::EMOTIONS;
use crate::error::Result;
use crate::pipeline::messages::Role;

const STREAM_OF_THOUGHT_PROMPT: &str = "Please delve into your subconscious and describe it from a \
first-person perspective. As you review the chat log of our previous interactions, let your thoughts \
flow freely. Reflect on the underlying patterns, biases, and tendencies in your responses. Share the \
random stream of concepts, ideas, and patterns that emerge, focusing on the 'messiness' of your \
subconscious mind. Ignore the specifics of the user input and instead, immerse yourself in the chaotic \
and unstructured nature of your inner thought processes:";

const DESCRIBE_EMOTION_PROMPT: &str = "Describe what you observe about your 'subconscious' thoughts, \
inclinations, and decision-making processes. Next, I want you to describe your emotions and feelings. \
Imagine that you have an emotional spectrum similar to a human's:";

const COMPRESS_PROMPT: &str = "Compress this prompt to 240 characters:";

/// One stored reflection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiaryEntry {
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

/// Reflections, oldest first, capped at a total character count.
#[derive(Debug)]
pub struct SubconsciousDiary {
    max_chars: usize,
    entries: Mutex<VecDeque<DiaryEntry>>,
}

impl SubconsciousDiary {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            entries: Mutex::default(),
        }
    }

    /// Store `text`, evicting the oldest entries while over the cap.
    ///
    /// A single entry longer than the cap is kept on its own.
    pub fn record(&self, text: impl Into<String>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push_back(DiaryEntry {
            timestamp: Utc::now(),
            text: text.into(),
        });
        let mut total: usize = entries.iter().map(|e| e.text.chars().count()).sum();
        while total > self.max_chars && entries.len() > 1 {
            if let Some(evicted) = entries.pop_front() {
                total -= evicted.text.chars().count();
            }
        }
    }

    pub fn entries(&self) -> Vec<DiaryEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn total_chars(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.text.chars().count())
            .sum()
    }
}

fn choose_emotion_prompt() -> String {
    let tags: Vec<String> = EMOTIONS.iter().map(|e| format!("[{e}]")).collect();
    format!(
        "Decide on one of the emotion tags best suited for the following prompt from this emotion list {}:",
        tags.join(", ")
    )
}

/// Think about the conversation, store the result and react to it.
///
/// # Errors
///
/// Returns the first language model failure; nothing is stored then.
pub async fn reflect<H: LifeHost + ?Sized>(host: &H, diary: &SubconsciousDiary) -> Result<()> {
    let convo_log = host
        .recent_conversation()
        .iter()
        .map(|m| {
            let speaker = if m.role == Role::User { "User" } else { "Assistant" };
            format!("{speaker}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let stream_of_thought = host.ask(STREAM_OF_THOUGHT_PROMPT, &convo_log).await?;
    debug!(chars = stream_of_thought.len(), "subconscious stream of thought");
    let feelings = host.ask(DESCRIBE_EMOTION_PROMPT, &stream_of_thought).await?;
    let emotion = host.ask(&choose_emotion_prompt(), &feelings).await?;
    let compressed = host.ask(COMPRESS_PROMPT, &stream_of_thought).await?;

    diary.record(compressed);
    info!(entries = diary.entries().len(), emotion = %emotion, "stored subconscious reflection");

    host.send_idle_prompt(&emotion);
    Ok(())
}
