//! Mock assistant responder.
//!
//! There is no real inference here: replies are canned strings chosen
//! deterministically from the prompt, with a rough token estimate. The
//! shape matches what a real model client would return so the chat handler
//! does not care which is behind it.

/// A generated assistant reply.
#[derive(Debug, Clone)]
pub struct Reply {
    /// Reply text.
    pub content: String,
    /// Estimated token count.
    pub tokens: u64,
}

const OPENERS: [&str; 5] = [
    "That's an interesting question! Let me help you with that.",
    "I understand what you're asking. Here's my perspective on this topic.",
    "Great question! This is a complex topic that requires careful consideration.",
    "I'd be happy to help you explore this further. Let me break it down for you.",
    "That's a thoughtful inquiry. Here's what I think about this subject.",
];

/// Generate a reply to a user message.
#[must_use]
pub fn generate_reply(prompt: &str) -> Reply {
    // Deterministic pick keeps tests stable.
    let seed = prompt
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    let opener = OPENERS[seed % OPENERS.len()];

    let content = format!(
        "{opener}\n\nThis is a mock response standing in for a real model. \
         In production this text would come from a generative-language API \
         using the conversation context and your message."
    );

    // Crude chars-per-token approximation, good enough for counters.
    let tokens = (content.len() as u64 / 4).max(1);

    Reply {
        content,
        tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_is_deterministic() {
        let a = generate_reply("hello world");
        let b = generate_reply("hello world");
        assert_eq!(a.content, b.content);
        assert_eq!(a.tokens, b.tokens);
        assert!(a.tokens > 0);
    }

    #[test]
    fn different_prompts_can_pick_different_openers() {
        let picks: std::collections::HashSet<String> = (0..32)
            .map(|i| generate_reply(&format!("prompt number {i}")).content)
            .collect();
        assert!(picks.len() > 1);
    }
}
