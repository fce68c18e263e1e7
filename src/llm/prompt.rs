//! Plain-text prompt rendering for completion-style backends.

use crate::pipeline::messages::{Message, Role};

/// Render `messages` as a transcript that ends with the character's turn.
///
/// ```text
/// <system prompt>
///
/// User: hi
/// Amica: hello!
/// Amica:
/// ```
pub fn build_prompt(messages: &[Message], name: &str) -> String {
    let mut prompt = String::new();
    for message in messages {
        match message.role {
            Role::System => {
                prompt.push_str(&message.content);
                prompt.push_str("\n\n");
            }
            Role::User => {
                prompt.push_str("User: ");
                prompt.push_str(&message.content);
                prompt.push('\n');
            }
            Role::Assistant => {
                prompt.push_str(name);
                prompt.push_str(": ");
                prompt.push_str(&message.content);
                prompt.push('\n');
            }
        }
    }
    prompt.push_str(name);
    prompt.push(':');
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_roles_and_trailing_speaker() {
        let messages = vec![
            Message::system("Be nice."),
            Message::user("hi"),
            Message::assistant("[happy] hello!"),
            Message::user("how are you?"),
        ];
        assert_eq!(
            build_prompt(&messages, "Amica"),
            "Be nice.\n\nUser: hi\nAmica: [happy] hello!\nUser: how are you?\nAmica:"
        );
    }

    #[test]
    fn empty_history_still_prompts_the_character() {
        assert_eq!(build_prompt(&[], "Mika"), "Mika:");
    }
}
