//! Conversation and message handlers, including the message credit gate.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use tally_core::{Conversation, ConversationId, Message};

use crate::ai;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Longest accepted message or title, in characters.
const MAX_CONTENT_CHARS: usize = 4000;
const MAX_TITLE_CHARS: usize = 200;

/// Conversation response.
#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    /// Conversation ID.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Number of messages.
    pub message_count: u64,
    /// When the last message was appended.
    pub last_message_at: Option<String>,
    /// When the conversation was created.
    pub created_at: String,
    /// When the conversation was last updated.
    pub updated_at: String,
}

impl From<&Conversation> for ConversationResponse {
    fn from(conv: &Conversation) -> Self {
        Self {
            id: conv.id.to_string(),
            title: conv.title.clone(),
            message_count: conv.message_count,
            last_message_at: conv.last_message_at.map(|t| t.to_rfc3339()),
            created_at: conv.created_at.to_rfc3339(),
            updated_at: conv.updated_at.to_rfc3339(),
        }
    }
}

/// Conversations list response.
#[derive(Debug, Serialize)]
pub struct ListConversationsResponse {
    /// Conversations, most recently active first.
    pub conversations: Vec<ConversationResponse>,
}

/// List the user's conversations.
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ListConversationsResponse>, ApiError> {
    let conversations = state.store.list_conversations_by_user(&auth.user_id, 50)?;

    Ok(Json(ListConversationsResponse {
        conversations: conversations.iter().map(ConversationResponse::from).collect(),
    }))
}

/// Conversation creation request.
#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    /// Display title.
    pub title: String,
}

/// Create a conversation.
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateConversationRequest>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let title = body.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Title is required".into()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ApiError::BadRequest("Title is too long".into()));
    }

    let conversation = Conversation::new(auth.user_id, title);
    state.store.put_conversation(&conversation)?;

    tracing::info!(
        user_id = %auth.user_id,
        conversation_id = %conversation.id,
        "Conversation created"
    );

    Ok(Json(ConversationResponse::from(&conversation)))
}

/// Load a conversation, enforcing ownership and liveness.
fn owned_conversation(
    state: &AppState,
    auth: &AuthUser,
    conversation_id: &str,
) -> Result<Conversation, ApiError> {
    let id: ConversationId = conversation_id
        .parse()
        .map_err(|_| ApiError::NotFound("Conversation not found".into()))?;

    let conversation = state
        .store
        .get_conversation(&id)?
        .filter(|c| c.user_id == auth.user_id && c.is_active)
        .ok_or_else(|| ApiError::NotFound("Conversation not found".into()))?;

    Ok(conversation)
}

/// Conversation rename request.
#[derive(Debug, Deserialize)]
pub struct RenameConversationRequest {
    /// New title.
    pub title: String,
}

/// Rename a conversation.
pub async fn rename_conversation(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(conversation_id): Path<String>,
    Json(body): Json<RenameConversationRequest>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let title = body.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Title is required".into()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ApiError::BadRequest("Title is too long".into()));
    }

    let mut conversation = owned_conversation(&state, &auth, &conversation_id)?;
    conversation.title = title.to_string();
    conversation.updated_at = chrono::Utc::now();
    state.store.put_conversation(&conversation)?;

    Ok(Json(ConversationResponse::from(&conversation)))
}

/// Soft-delete a conversation.
pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(conversation_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut conversation = owned_conversation(&state, &auth, &conversation_id)?;
    conversation.is_active = false;
    conversation.updated_at = chrono::Utc::now();
    state.store.put_conversation(&conversation)?;

    tracing::info!(
        user_id = %auth.user_id,
        conversation_id = %conversation.id,
        "Conversation deleted"
    );

    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Message list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    /// Maximum number of messages to return (default: 50).
    #[serde(default = "default_messages_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_messages_limit() -> usize {
    50
}

/// Message response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Message ID.
    pub id: String,
    /// Author role.
    pub role: String,
    /// Message text.
    pub content: String,
    /// Token count, for assistant messages.
    pub tokens: Option<u64>,
    /// Timestamp.
    pub created_at: String,
}

impl From<&Message> for MessageResponse {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id.to_string(),
            role: format!("{:?}", msg.role).to_lowercase(),
            content: msg.content.clone(),
            tokens: msg.tokens,
            created_at: msg.created_at.to_rfc3339(),
        }
    }
}

/// Messages list response.
#[derive(Debug, Serialize)]
pub struct ListMessagesResponse {
    /// Messages, oldest first.
    pub messages: Vec<MessageResponse>,
}

/// List a conversation's messages.
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(conversation_id): Path<String>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<ListMessagesResponse>, ApiError> {
    let conversation = owned_conversation(&state, &auth, &conversation_id)?;

    let limit = query.limit.min(100);
    let messages = state
        .store
        .list_messages(&conversation.id, limit, query.offset)?;

    Ok(Json(ListMessagesResponse {
        messages: messages.iter().map(MessageResponse::from).collect(),
    }))
}

/// Send-message request.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Message text.
    pub content: String,
}

/// Send-message response.
#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    /// The persisted user message.
    pub user_message: MessageResponse,
    /// The assistant reply.
    pub ai_message: MessageResponse,
    /// Balance after the debit.
    pub credits: i64,
}

/// Send a message: the message credit gate.
///
/// The debit comes first and the message write second, so a message can
/// never be saved without having been billed. If the save fails, the debit
/// is compensated with an atomic +1 before the save error is surfaced; the
/// window in between is the only inconsistency this ordering admits, and it
/// heals here.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(conversation_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let content = body.content.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest("Message content is required".into()));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::BadRequest("Message content is too long".into()));
    }

    let conversation = owned_conversation(&state, &auth, &conversation_id)?;

    // Debit before the dependent write. InsufficientCredits maps to 402
    // with no mutation having happened.
    let balance = state.store.debit_credits(&auth.user_id, 1)?;

    let user_message = Message::from_user(conversation.id, auth.user_id, content);
    if let Err(save_err) = state.store.append_message(&user_message) {
        // Compensate: the user must not stay debited for a message that was
        // never durably recorded.
        match state.store.refund_credits(&auth.user_id, 1) {
            Ok(_) => {
                tracing::warn!(
                    user_id = %auth.user_id,
                    conversation_id = %conversation.id,
                    error = %save_err,
                    "Message save failed, debit rolled back"
                );
            }
            Err(refund_err) => {
                tracing::error!(
                    user_id = %auth.user_id,
                    conversation_id = %conversation.id,
                    save_error = %save_err,
                    refund_error = %refund_err,
                    "Message save failed AND rollback failed; account is over-debited"
                );
            }
        }
        return Err(ApiError::Internal("Failed to send message".into()));
    }

    let reply = ai::generate_reply(content);
    let ai_message =
        Message::from_assistant(conversation.id, auth.user_id, reply.content, reply.tokens);
    if let Err(e) = state.store.append_message(&ai_message) {
        // The user message is saved and billed; surfacing the error without
        // compensation keeps "saved implies billed" intact.
        tracing::error!(
            user_id = %auth.user_id,
            conversation_id = %conversation.id,
            error = %e,
            "Assistant reply could not be saved"
        );
        return Err(ApiError::Internal("Failed to send message".into()));
    }

    Ok(Json(SendMessageResponse {
        user_message: MessageResponse::from(&user_message),
        ai_message: MessageResponse::from(&ai_message),
        credits: balance,
    }))
}
