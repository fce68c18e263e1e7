//! Turn a streamed HTTP body into a [`TextStream`].

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use super::TextStream;
use super::sse::{LineBuffer, SseLineParser};
use crate::error::{ChatError, Result};

/// How payloads are framed in the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    /// `data:` events separated by blank lines, `[DONE]` terminates.
    Sse,
    /// One JSON document per line.
    Ndjson,
}

/// What one payload contributed to the response.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Delta {
    pub text: String,
    pub done: bool,
}

impl Delta {
    pub(crate) fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: false,
        }
    }
}

pub(crate) type ParseFn = fn(&str) -> Result<Delta>;

enum Frame {
    Payload(String),
    Done,
}

enum FrameDecoder {
    Sse(SseLineParser),
    Ndjson(LineBuffer),
}

impl FrameDecoder {
    fn new(framing: Framing) -> Self {
        match framing {
            Framing::Sse => Self::Sse(SseLineParser::new()),
            Framing::Ndjson => Self::Ndjson(LineBuffer::new()),
        }
    }

    fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        match self {
            Self::Sse(parser) => parser.push(chunk).into_iter().map(sse_frame).collect(),
            Self::Ndjson(lines) => lines.push(chunk).into_iter().filter_map(json_frame).collect(),
        }
    }

    fn flush(&mut self) -> Vec<Frame> {
        match self {
            Self::Sse(parser) => parser.flush().into_iter().map(sse_frame).collect(),
            Self::Ndjson(lines) => lines.flush().into_iter().filter_map(json_frame).collect(),
        }
    }
}

fn sse_frame(event: super::sse::SseEvent) -> Frame {
    if event.is_done() {
        Frame::Done
    } else {
        Frame::Payload(event.data)
    }
}

fn json_frame(line: String) -> Option<Frame> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(Frame::Payload(trimmed.to_owned()))
}

struct DecodeState {
    byte_stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    decoder: FrameDecoder,
    parse: ParseFn,
    provider: &'static str,
    pending: VecDeque<Result<String>>,
    done: bool,
}

impl DecodeState {
    fn absorb(&mut self, frames: Vec<Frame>) {
        for frame in frames {
            if self.done {
                break;
            }
            let payload = match frame {
                Frame::Done => {
                    self.done = true;
                    break;
                }
                Frame::Payload(payload) => payload,
            };
            match (self.parse)(&payload) {
                Ok(delta) => {
                    if !delta.text.is_empty() {
                        self.pending.push_back(Ok(delta.text));
                    }
                    self.done = delta.done;
                }
                Err(e) => {
                    self.pending.push_back(Err(e));
                    self.done = true;
                }
            }
        }
    }
}

/// Decode `byte_stream` into text fragments using `parse` on each payload.
///
/// The stream ends after a terminal payload, a parse error, or a read error;
/// errors are yielded as the final item.
pub(crate) fn decode_text_stream(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    framing: Framing,
    provider: &'static str,
    parse: ParseFn,
) -> TextStream {
    let state = DecodeState {
        byte_stream: Box::pin(byte_stream),
        decoder: FrameDecoder::new(framing),
        parse,
        provider,
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.byte_stream.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.decoder.push(&chunk);
                    state.absorb(frames);
                }
                Some(Err(e)) => {
                    state.done = true;
                    let err = ChatError::Llm(format!("{} stream read error: {e}", state.provider));
                    return Some((Err(err), state));
                }
                None => {
                    let frames = state.decoder.flush();
                    state.absorb(frames);
                    state.done = true;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn body(chunks: &[&'static str]) -> impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static {
        let items: Vec<reqwest::Result<Bytes>> = chunks.iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))).collect();
        futures_util::stream::iter(items)
    }

    fn parse_plain(payload: &str) -> Result<Delta> {
        if payload == "bad" {
            return Err(ChatError::Llm("bad payload".to_owned()));
        }
        Ok(Delta {
            text: payload.to_owned(),
            done: payload.ends_with('!'),
        })
    }

    async fn collect(stream: TextStream) -> Vec<Result<String>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn sse_payloads_until_done() {
        let stream = decode_text_stream(
            body(&["data: Hel", "lo\n\ndata: there\n\ndata: [DONE]\n\ndata: ignored\n\n"]),
            Framing::Sse,
            "test",
            parse_plain,
        );
        let items: Vec<String> = collect(stream).await.into_iter().map(Result::unwrap).collect();
        assert_eq!(items, vec!["Hello", "there"]);
    }

    #[tokio::test]
    async fn ndjson_stops_on_terminal_payload() {
        let stream = decode_text_stream(body(&["a\nb", "!\nc\n"]), Framing::Ndjson, "test", parse_plain);
        let items: Vec<String> = collect(stream).await.into_iter().map(Result::unwrap).collect();
        assert_eq!(items, vec!["a", "b!"]);
    }

    #[tokio::test]
    async fn ndjson_flushes_unterminated_last_line() {
        let stream = decode_text_stream(body(&["a\nb"]), Framing::Ndjson, "test", parse_plain);
        let items: Vec<String> = collect(stream).await.into_iter().map(Result::unwrap).collect();
        assert_eq!(items, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn parse_error_is_last_item() {
        let stream = decode_text_stream(body(&["ok\nbad\nnever\n"]), Framing::Ndjson, "test", parse_plain);
        let items = collect(stream).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "ok");
        assert!(matches!(items[1], Err(ChatError::Llm(_))));
    }
}
