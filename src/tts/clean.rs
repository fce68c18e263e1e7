//! Reduce a displayed sentence to what should actually be spoken.

/// Emoji blocks that voices read out literally or choke on.
const EMOJI_RANGES: &[(u32, u32)] = &[
    (0x1F600, 0x1F64F), // emoticons
    (0x1F300, 0x1F5FF), // symbols & pictographs
    (0x1F680, 0x1F6FF), // transport & map
    (0x1F1E0, 0x1F1FF), // flags
];

fn is_emoji(ch: char) -> bool {
    let cp = u32::from(ch);
    EMOJI_RANGES.iter().any(|&(lo, hi)| (lo..=hi).contains(&cp))
}

/// Remove `*role-play actions*`. An unmatched `*` is dropped on its own.
fn strip_role_play(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('*') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('*') {
            Some(close) => rest = &after[close + 1..],
            None => rest = after,
        }
    }
    out.push_str(rest);
    out
}

/// Speakable form of `text`: no emoji, no text smileys, no role-play
/// actions, single spaces, trimmed. May be empty.
pub fn speakable_text(text: &str) -> String {
    let no_actions = strip_role_play(text);
    let mut cleaned: String = no_actions.chars().filter(|&c| !is_emoji(c)).collect();

    for smiley in [" :)", " :D", " :(", " ;)"] {
        cleaned = cleaned.replace(smiley, "");
    }
    let mut trimmed = cleaned.trim();
    for smiley in [":)", ":D"] {
        if let Some(rest) = trimmed.strip_prefix(smiley) {
            trimmed = rest.trim_start();
        }
    }

    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_emoji() {
        assert_eq!(speakable_text("Great job 😀🚀!"), "Great job !");
    }

    #[test]
    fn removes_text_smileys() {
        assert_eq!(speakable_text("Nice to meet you :)"), "Nice to meet you");
        assert_eq!(speakable_text(":D Hello!"), "Hello!");
    }

    #[test]
    fn removes_role_play_actions() {
        assert_eq!(speakable_text("*waves happily* Hi there!"), "Hi there!");
        assert_eq!(speakable_text("Oh *blushes* thanks."), "Oh thanks.");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(speakable_text("  a   b \n c  "), "a b c");
    }

    #[test]
    fn action_only_sentence_is_empty() {
        assert!(speakable_text("*nods.*").is_empty());
    }

    #[test]
    fn keeps_non_emoji_unicode() {
        assert_eq!(speakable_text("こんにちは。"), "こんにちは。");
    }
}
