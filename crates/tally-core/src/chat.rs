//! Conversation and message records.
//!
//! These are the dependent writes guarded by the message credit gate; the
//! types themselves carry no billing logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConversationId, MessageId, UserId};

/// A chat conversation owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID (ULID).
    pub id: ConversationId,

    /// Owning user.
    pub user_id: UserId,

    /// Display title.
    pub title: String,

    /// Number of messages in the conversation.
    pub message_count: u64,

    /// Total assistant tokens accumulated.
    pub total_tokens: u64,

    /// When the last message was appended.
    pub last_message_at: Option<DateTime<Utc>>,

    /// Soft-delete flag; inactive conversations are hidden and read-only.
    pub is_active: bool,

    /// When the conversation was created.
    pub created_at: DateTime<Utc>,

    /// When the conversation was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create an empty conversation.
    #[must_use]
    pub fn new(user_id: UserId, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::generate(),
            user_id,
            title: title.into(),
            message_count: 0,
            total_tokens: 0,
            last_message_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record an appended message in the aggregate counters.
    pub fn note_message(&mut self, tokens: u64) {
        let now = Utc::now();
        self.message_count += 1;
        self.total_tokens += tokens;
        self.last_message_at = Some(now);
        self.updated_at = now;
    }
}

/// One chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID (ULID, time-ordered within the conversation).
    pub id: MessageId,

    /// Owning conversation.
    pub conversation_id: ConversationId,

    /// Owning user.
    pub user_id: UserId,

    /// Who authored the message.
    pub role: MessageRole,

    /// Message text.
    pub content: String,

    /// Token count, for assistant messages.
    pub tokens: Option<u64>,

    /// When the message was created.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a user-authored message.
    #[must_use]
    pub fn from_user(
        conversation_id: ConversationId,
        user_id: UserId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            conversation_id,
            user_id,
            role: MessageRole::User,
            content: content.into(),
            tokens: None,
            created_at: Utc::now(),
        }
    }

    /// Create an assistant reply.
    #[must_use]
    pub fn from_assistant(
        conversation_id: ConversationId,
        user_id: UserId,
        content: impl Into<String>,
        tokens: u64,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            conversation_id,
            user_id,
            role: MessageRole::Assistant,
            content: content.into(),
            tokens: Some(tokens),
            created_at: Utc::now(),
        }
    }
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// The human user.
    User,

    /// The assistant responder.
    Assistant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_message_updates_counters() {
        let mut conv = Conversation::new(UserId::generate(), "Hello");
        assert_eq!(conv.message_count, 0);
        assert!(conv.last_message_at.is_none());

        conv.note_message(0);
        conv.note_message(42);

        assert_eq!(conv.message_count, 2);
        assert_eq!(conv.total_tokens, 42);
        assert!(conv.last_message_at.is_some());
    }

    #[test]
    fn user_message_has_no_tokens() {
        let conv = Conversation::new(UserId::generate(), "Hello");
        let msg = Message::from_user(conv.id, conv.user_id, "hi there");
        assert_eq!(msg.role, MessageRole::User);
        assert!(msg.tokens.is_none());
    }
}
