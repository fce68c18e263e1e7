//! Incremental tag-and-sentence segmentation of a streamed response.
//!
//! The segmenter is fed text chunks as they arrive from the language model
//! and emits [`Segment`]s as soon as a sentence boundary is visible:
//!
//! - A leading `[word]` token is removed and becomes the tag of the next
//!   emitted segment only. Inside a sentence only brackets naming a known
//!   emotion are tags; anything else (`arr[0]`, `[1]`) is kept as text.
//! - A boundary is the earliest terminator from [`SENTENCE_TERMINATORS`]
//!   with at least one character before it, or an ASCII comma with at least
//!   [`COMMA_SPLIT_MIN_CHARS`] characters before it.
//! - Segments without any alphanumeric character are discarded; a pending
//!   tag survives the discard.
//! - `<think>...</think>` blocks never reach the output.
//!
//! Every decision depends only on text before the boundary, so the output is
//! the same for any chunking of the same stream.

use tracing::debug;

use crate::emotion::is_known_emotion;
use crate::pipeline::messages::Segment;

/// Characters that end a speakable sentence.
pub const SENTENCE_TERMINATORS: [char; 8] = ['.', '!', '?', '\n', '。', '！', '？', '，'];

/// Minimum characters before an ASCII comma for it to split a segment.
pub const COMMA_SPLIT_MIN_CHARS: usize = 10;

/// Longest bracket body still treated as a tag.
pub const MAX_TAG_CHARS: usize = 32;

/// Stateful splitter for one response stream.
#[derive(Debug, Default)]
pub struct ResponseSegmenter {
    buffer: String,
    pending_tag: Option<String>,
    think: ThinkTagStripper,
}

enum LeadingTag {
    Taken,
    Incomplete,
    Absent,
}

impl ResponseSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return the segments it completed, in order.
    pub fn push(&mut self, chunk: &str) -> Vec<Segment> {
        let visible = self.think.push(chunk);
        self.buffer.push_str(&visible);
        self.drain(false)
    }

    /// End of stream: drain what is complete and decide the fate of the
    /// unterminated tail.
    ///
    /// With `flush_trailing == false` the tail is dropped.
    pub fn finish(&mut self, flush_trailing: bool) -> Vec<Segment> {
        let tail = self.think.finish();
        self.buffer.push_str(&tail);
        let mut segments = self.drain(true);

        let rest = std::mem::take(&mut self.buffer);
        if flush_trailing {
            segments.extend(self.make_segment(&rest));
        } else if rest.chars().any(char::is_alphanumeric) {
            debug!(fragment = %rest.trim(), "dropping unterminated trailing fragment");
        }
        self.pending_tag = None;
        segments
    }

    /// Text received but not yet emitted.
    pub fn pending_text(&self) -> &str {
        &self.buffer
    }

    /// Cut every complete sentence off the buffer. At end of stream a `[`
    /// that never closed is plain text.
    fn drain(&mut self, at_end: bool) -> Vec<Segment> {
        let mut segments = Vec::new();
        loop {
            let leading_ws = self.buffer.len() - self.buffer.trim_start().len();
            self.buffer.drain(..leading_ws);

            match self.take_leading_tag() {
                LeadingTag::Taken => continue,
                LeadingTag::Incomplete if !at_end => break,
                LeadingTag::Incomplete | LeadingTag::Absent => {}
            }

            let Some(end) = find_boundary(&self.buffer) else {
                break;
            };
            let raw: String = self.buffer.drain(..end).collect();
            segments.extend(self.make_segment(&raw));
        }
        segments
    }

    fn take_leading_tag(&mut self) -> LeadingTag {
        if !self.buffer.starts_with('[') {
            return LeadingTag::Absent;
        }
        for (count, (idx, ch)) in self.buffer.char_indices().skip(1).enumerate() {
            if count > MAX_TAG_CHARS || ch == '[' || ch == '\n' {
                return LeadingTag::Absent;
            }
            if ch == ']' {
                let tag = self.buffer[1..idx].trim().to_owned();
                self.buffer.drain(..=idx);
                if !tag.is_empty() {
                    self.pending_tag = Some(tag);
                }
                return LeadingTag::Taken;
            }
        }
        LeadingTag::Incomplete
    }

    fn make_segment(&mut self, raw: &str) -> Option<Segment> {
        let (text, inline_tag) = strip_inline_tags(raw);
        let text = text.trim();
        if !text.chars().any(char::is_alphanumeric) {
            if self.pending_tag.is_none() {
                self.pending_tag = inline_tag;
            }
            return None;
        }
        let tag = self.pending_tag.take().or(inline_tag).unwrap_or_default();
        Some(Segment::new(tag, text))
    }
}

fn find_boundary(text: &str) -> Option<usize> {
    for (count, (idx, ch)) in text.char_indices().enumerate() {
        if count >= 1 && SENTENCE_TERMINATORS.contains(&ch) {
            return Some(idx + ch.len_utf8());
        }
        if ch == ',' && count >= COMMA_SPLIT_MIN_CHARS {
            return Some(idx + 1);
        }
    }
    None
}

/// Remove `[emotion]` tokens from a sentence, returning the first one found.
fn strip_inline_tags(raw: &str) -> (String, Option<String>) {
    let mut out = String::with_capacity(raw.len());
    let mut first_tag = None;
    let mut rest = raw;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        match after.find(']') {
            Some(close) if is_known_emotion(&after[..close]) => {
                out.push_str(&rest[..open]);
                let body = after[..close].trim();
                if first_tag.is_none() && !body.is_empty() {
                    first_tag = Some(body.to_owned());
                }
                rest = &after[close + 1..];
                if out.ends_with(' ') {
                    rest = rest.trim_start_matches(' ');
                }
            }
            _ => {
                out.push_str(&rest[..=open]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    (out, first_tag)
}

/// `raw` with every `<think>...</think>` block removed. An unclosed block
/// hides everything after its opening tag.
pub fn visible_text(raw: &str) -> String {
    let mut think = ThinkTagStripper::default();
    let mut out = think.push(raw);
    out.push_str(&think.finish());
    out
}

/// Incremental remover for `<think>...</think>` reasoning blocks.
#[derive(Debug, Default)]
struct ThinkTagStripper {
    in_think_block: bool,
    carry: String,
}

impl ThinkTagStripper {
    const OPEN: &'static str = "<think>";
    const CLOSE: &'static str = "</think>";

    /// Feed one fragment and return newly-visible text (outside think blocks).
    fn push(&mut self, fragment: &str) -> String {
        self.carry.push_str(fragment);

        let mut visible = String::new();
        loop {
            if self.in_think_block {
                if let Some(end) = self.carry.find(Self::CLOSE) {
                    self.carry.drain(..end + Self::CLOSE.len());
                    self.in_think_block = false;
                    continue;
                }
                let keep = partial_tag_suffix(&self.carry, Self::CLOSE);
                self.carry.drain(..self.carry.len() - keep);
                break;
            }

            if let Some(start) = self.carry.find(Self::OPEN) {
                visible.push_str(&self.carry[..start]);
                self.carry.drain(..start + Self::OPEN.len());
                self.in_think_block = true;
                continue;
            }

            // Hold back only a suffix that could still grow into `<think>`.
            let emit = self.carry.len() - partial_tag_suffix(&self.carry, Self::OPEN);
            visible.push_str(&self.carry[..emit]);
            self.carry.drain(..emit);
            break;
        }
        visible
    }

    /// Flush any remaining visible tail.
    fn finish(&mut self) -> String {
        if self.in_think_block {
            self.in_think_block = false;
            self.carry.clear();
            return String::new();
        }
        std::mem::take(&mut self.carry)
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of `tag`.
fn partial_tag_suffix(text: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .find(|&n| text.ends_with(&tag[..n]))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn segment_all(chunks: &[&str], flush: bool) -> Vec<Segment> {
        let mut segmenter = ResponseSegmenter::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(segmenter.push(chunk));
        }
        out.extend(segmenter.finish(flush));
        out
    }

    /// Split `text` into chunks of `size` characters.
    fn chunked(text: &str, size: usize) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars.chunks(size).map(|c| c.iter().collect()).collect()
    }

    fn segment_chunked(text: &str, size: usize, flush: bool) -> Vec<Segment> {
        let chunks = chunked(text, size);
        let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        segment_all(&refs, flush)
    }

    #[test]
    fn leading_tag_is_extracted() {
        let segments = segment_all(&["[happy] Hello there."], false);
        assert_eq!(segments, vec![Segment::new("happy", "Hello there.")]);
    }

    #[test]
    fn tag_applies_to_next_segment_only() {
        let segments = segment_all(&["[happy] Hi. Bye."], false);
        assert_eq!(
            segments,
            vec![Segment::new("happy", "Hi."), Segment::new("", "Bye.")]
        );
    }

    #[test]
    fn nothing_is_emitted_before_a_terminator() {
        let mut segmenter = ResponseSegmenter::new();
        assert!(segmenter.push("Hello world").is_empty());
        assert_eq!(segmenter.pending_text(), "Hello world");
        assert_eq!(segmenter.push("."), vec![Segment::new("", "Hello world.")]);
    }

    #[test]
    fn tag_split_across_chunks_waits_for_closing_bracket() {
        let segments = segment_all(&["[hap", "py] Hel", "lo."], false);
        assert_eq!(segments, vec![Segment::new("happy", "Hello.")]);
    }

    #[test]
    fn short_comma_does_not_split() {
        let segments = segment_all(&["Well, hi."], false);
        assert_eq!(segments, vec![Segment::new("", "Well, hi.")]);
    }

    #[test]
    fn long_comma_clause_splits() {
        let segments = segment_all(&["This is a long clause, and more."], false);
        assert_eq!(
            segments,
            vec![
                Segment::new("", "This is a long clause,"),
                Segment::new("", "and more."),
            ]
        );
    }

    #[test]
    fn comma_threshold_is_exact() {
        // Exactly COMMA_SPLIT_MIN_CHARS characters before the comma.
        let head = "a".repeat(COMMA_SPLIT_MIN_CHARS);
        let text = format!("{head}, tail.");
        let segments = segment_all(&[&text], false);
        assert_eq!(segments[0].text, format!("{head},"));

        let short = "a".repeat(COMMA_SPLIT_MIN_CHARS - 1);
        let text = format!("{short}, tail.");
        let segments = segment_all(&[&text], false);
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn cjk_terminators_split() {
        let segments = segment_all(&["こんにちは。元気ですか？"], false);
        assert_eq!(
            segments,
            vec![Segment::new("", "こんにちは。"), Segment::new("", "元気ですか？")]
        );
    }

    #[test]
    fn newline_is_a_boundary() {
        let segments = segment_all(&["First line\nSecond line."], false);
        assert_eq!(
            segments,
            vec![Segment::new("", "First line"), Segment::new("", "Second line.")]
        );
    }

    #[test]
    fn punctuation_only_segment_is_discarded_and_keeps_tag() {
        let segments = segment_all(&["Hi. [happy] ?! Bye."], false);
        assert_eq!(
            segments,
            vec![Segment::new("", "Hi."), Segment::new("happy", "Bye.")]
        );
    }

    #[test]
    fn emoji_only_segment_is_discarded() {
        let segments = segment_all(&["😀. Hello."], false);
        assert_eq!(segments, vec![Segment::new("", "Hello.")]);
    }

    #[test]
    fn inline_tag_is_removed_and_adopted() {
        let segments = segment_all(&["Hello [surprised] there."], false);
        assert_eq!(segments, vec![Segment::new("surprised", "Hello there.")]);
    }

    #[test]
    fn inline_brackets_that_are_not_emotions_stay_in_the_text() {
        let segments = segment_all(&["Use arr[0] here. See [1] for details."], false);
        assert_eq!(
            segments,
            vec![
                Segment::new("", "Use arr[0] here."),
                Segment::new("", "See [1] for details."),
            ]
        );
    }

    #[test]
    fn unclosed_leading_bracket_still_yields_terminated_sentences() {
        let mut segmenter = ResponseSegmenter::new();
        assert!(segmenter.push("[Hi there. Bye.").is_empty());
        assert_eq!(
            segmenter.finish(false),
            vec![Segment::new("", "[Hi there."), Segment::new("", "Bye.")]
        );

        let segments = segment_chunked("[Hi there. Bye. And a tail", 3, false);
        assert_eq!(
            segments,
            vec![Segment::new("", "[Hi there."), Segment::new("", "Bye.")]
        );
    }

    #[test]
    fn leading_tag_wins_over_inline_tag() {
        let segments = segment_all(&["[sad] Oh [happy] well."], false);
        assert_eq!(segments, vec![Segment::new("sad", "Oh well.")]);
    }

    #[test]
    fn overlong_bracket_is_plain_text() {
        let body = "x".repeat(MAX_TAG_CHARS + 5);
        let text = format!("[{body}] ok.");
        let segments = segment_all(&[&text], false);
        assert_eq!(segments, vec![Segment::new("", text.as_str())]);
    }

    #[test]
    fn think_blocks_are_stripped_across_chunks() {
        let segments = segment_all(&["<thi", "nk>I should greet.</th", "ink>[happy] Hi there."], false);
        assert_eq!(segments, vec![Segment::new("happy", "Hi there.")]);
    }

    #[test]
    fn unclosed_think_block_hides_the_rest() {
        let segments = segment_all(&["Sure. <think>hmm. more."], true);
        assert_eq!(segments, vec![Segment::new("", "Sure.")]);
    }

    #[test]
    fn lone_angle_bracket_is_not_swallowed() {
        let segments = segment_all(&["1 <", " 2 is true."], false);
        assert_eq!(segments, vec![Segment::new("", "1 < 2 is true.")]);
    }

    #[test]
    fn terminated_text_reconstructs_for_every_chunk_size() {
        let text = "[happy] Hello there. How are you? [sad] I miss you, my dear friend! \
                    [relaxed] Let's rest.";
        let expected_text = "Hello there. How are you? I miss you, my dear friend! Let's rest.";
        let reference = segment_all(&[text], false);
        let joined: Vec<&str> = reference.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(joined.join(" "), expected_text);
        let tags: Vec<&str> = reference.iter().map(|s| s.tag.as_str()).collect();
        assert_eq!(tags, vec!["happy", "", "sad", "", "relaxed"]);

        for size in 1..=text.chars().count() {
            assert_eq!(segment_chunked(text, size, false), reference, "chunk size {size}");
        }
    }

    #[test]
    fn unterminated_tail_is_dropped_for_every_chunk_size() {
        let text = "[happy] Hello there. And then";
        for size in 1..=text.chars().count() {
            let segments = segment_chunked(text, size, false);
            assert_eq!(segments, vec![Segment::new("happy", "Hello there.")], "chunk size {size}");
        }
    }

    #[test]
    fn unterminated_tail_is_flushed_when_requested() {
        let segments = segment_all(&["Hello there. [sad] And then"], true);
        assert_eq!(
            segments,
            vec![Segment::new("", "Hello there."), Segment::new("sad", "And then")]
        );
    }

    #[test]
    fn lone_tag_at_end_emits_nothing() {
        assert!(segment_all(&["[happy]"], true).is_empty());
    }

    #[test]
    fn visible_text_removes_reasoning() {
        assert_eq!(visible_text("<think>hmm</think>[happy] Hi."), "[happy] Hi.");
        assert_eq!(visible_text("Hi.<think>never closed"), "Hi.");
        assert_eq!(visible_text("a < b"), "a < b");
    }
}
