//! Offline backend that repeats the last message.

use async_trait::async_trait;

use super::{ChatBackend, TextStream};
use crate::error::Result;
use crate::pipeline::messages::Message;
use crate::pipeline::segmenter::SENTENCE_TERMINATORS;

/// Streams the last message back word by word, adding a full stop if the
/// text has no terminator so it is always spoken.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoBackend;

#[async_trait]
impl ChatBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    async fn send(&self, messages: &[Message]) -> Result<TextStream> {
        let mut text = messages
            .last()
            .map(|m| m.content.trim().to_owned())
            .unwrap_or_default();
        if !text.is_empty() && !text.ends_with(SENTENCE_TERMINATORS) {
            text.push('.');
        }
        let words: Vec<Result<String>> = text.split_inclusive(' ').map(|w| Ok(w.to_owned())).collect();
        Ok(Box::pin(futures_util::stream::iter(words)))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use futures_util::StreamExt;

    use super::*;

    async fn echo(text: &str) -> String {
        let stream = EchoBackend.send(&[Message::user(text)]).await.unwrap();
        let parts: Vec<Result<String>> = stream.collect().await;
        parts.into_iter().map(Result::unwrap).collect()
    }

    #[tokio::test]
    async fn appends_full_stop_when_missing() {
        assert_eq!(echo("hello there").await, "hello there.");
    }

    #[tokio::test]
    async fn keeps_existing_terminator() {
        assert_eq!(echo("[happy] hi!").await, "[happy] hi!");
    }

    #[tokio::test]
    async fn empty_conversation_streams_nothing() {
        let stream = EchoBackend.send(&[]).await.unwrap();
        assert_eq!(stream.count().await, 0);
    }
}
