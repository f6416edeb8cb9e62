//! Request-handling core: mutates the store, resolves statuses and hands
//! the resulting events to the broadcaster.

mod conversations;
mod groups;
mod messages;
mod reactions;
mod users;
pub mod validate;

pub use messages::SendOutcome;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use wasa_db::Database;
use wasa_db::models::{ConversationRow, MessageRow, ReactionRow, UserRow};
use wasa_gateway::{Broadcaster, ConnectionRegistry};
use wasa_types::api::{ConversationResponse, MessageResponse, ReactionResponse, UserResponse};
use wasa_types::models::{ContentKind, ConversationKind, MessageStatus, parse_timestamp};
use wasa_types::status::ReceiptCounts;

use crate::error::ApiError;

/// Title of the conversation a user has with themself.
pub const SELF_CONVERSATION_TITLE: &str = "Message Yourself";

const PHOTO_SNIPPET: &str = "[photo]";

#[derive(Clone)]
pub struct ConversationService {
    db: Arc<Database>,
    broadcaster: Broadcaster,
}

impl ConversationService {
    pub fn new(db: Arc<Database>, broadcaster: Broadcaster) -> Self {
        Self { db, broadcaster }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        self.broadcaster.registry()
    }

    /// Run store work off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }
}

// -- Response builders --

pub(crate) fn user_response(row: &UserRow) -> UserResponse {
    UserResponse {
        id: row.id.clone(),
        name: row.name.clone(),
        photo_url: row.photo_url.clone(),
    }
}

/// Parse a stored timestamp, logging rather than failing on a corrupt value.
pub(crate) fn stored_time(raw: &str, what: &str) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap_or_else(|| {
        warn!("Corrupt timestamp '{}' on {}", raw, what);
        DateTime::default()
    })
}

/// List-view text for a message: `[photo]` for photos, the text otherwise.
pub(crate) fn snippet(kind: ContentKind, text: Option<&str>) -> Option<String> {
    match kind {
        ContentKind::Photo => Some(PHOTO_SNIPPET.to_string()),
        _ => text.map(str::to_string),
    }
}

pub(crate) fn reaction_response(row: &ReactionRow, users: &HashMap<String, UserRow>) -> ReactionResponse {
    ReactionResponse {
        id: row.id.clone(),
        emoji: row.emoji.clone(),
        user: users
            .get(&row.user_id)
            .map(user_response)
            .unwrap_or_else(|| unknown_user(&row.user_id)),
        created_at: stored_time(&row.created_at, &format!("reaction {}", row.id)),
    }
}

pub(crate) fn message_response(
    row: &MessageRow,
    sender: UserResponse,
    status: MessageStatus,
    reactions: Vec<ReactionResponse>,
) -> MessageResponse {
    MessageResponse {
        id: row.id.clone(),
        conversation_id: row.conversation_id.clone(),
        sender,
        created_at: stored_time(&row.created_at, &format!("message {}", row.id)),
        content_type: row.content_type,
        text: row.text.clone(),
        photo_url: row.photo_url.clone(),
        file_url: row.file_url.clone(),
        file_name: row.file_name.clone(),
        replied_to_message_id: row.replied_to_message_id.clone(),
        status,
        reactions,
        is_forwarded: row.is_forwarded,
    }
}

/// Placeholder for a user row that no longer resolves.
fn unknown_user(id: &str) -> UserResponse {
    UserResponse {
        id: id.to_string(),
        name: String::new(),
        photo_url: None,
    }
}

/// Title and photo of a conversation as seen by `viewer_id`. Direct chats
/// take them from the other participant.
fn presentation(conv: &ConversationRow, participants: &[UserRow], viewer_id: &str) -> (String, Option<String>) {
    match conv.kind {
        ConversationKind::Group => (conv.name.clone().unwrap_or_default(), conv.photo_url.clone()),
        ConversationKind::Direct => match participants.iter().find(|p| p.id != viewer_id) {
            Some(peer) => (peer.name.clone(), peer.photo_url.clone()),
            None => (
                SELF_CONVERSATION_TITLE.to_string(),
                participants.iter().find_map(|p| p.photo_url.clone()),
            ),
        },
    }
}

/// Full conversation record for `viewer_id`. Message statuses are resolved
/// fresh from the markers; the stored hints are not consulted.
fn load_conversation(
    db: &Database,
    conv: &ConversationRow,
    viewer_id: &str,
    with_messages: bool,
) -> Result<ConversationResponse, ApiError> {
    let participants = db.get_participants(&conv.id)?;
    let (title, photo_url) = presentation(conv, &participants, viewer_id);

    let messages = if with_messages {
        load_messages(db, &conv.id, &participants)?
    } else {
        Vec::new()
    };

    Ok(ConversationResponse {
        id: conv.id.clone(),
        kind: conv.kind,
        title,
        photo_url,
        participants: participants.iter().map(user_response).collect(),
        messages,
    })
}

fn load_messages(
    db: &Database,
    conversation_id: &str,
    participants: &[UserRow],
) -> Result<Vec<MessageResponse>, ApiError> {
    let rows = db.get_messages(conversation_id)?;
    let reaction_rows = db.get_reactions_for_conversation(conversation_id)?;
    let counts = db.receipt_counts_for_conversation(conversation_id)?;

    // Senders and reactors may have left; fetch whoever is not a participant.
    let mut users: HashMap<String, UserRow> =
        participants.iter().map(|u| (u.id.clone(), u.clone())).collect();
    let mut missing: Vec<String> = rows
        .iter()
        .map(|m| &m.sender_id)
        .chain(reaction_rows.iter().map(|r| &r.user_id))
        .filter(|id| !users.contains_key(*id))
        .cloned()
        .collect();
    missing.sort();
    missing.dedup();
    for user in db.get_users_by_ids(&missing)? {
        users.insert(user.id.clone(), user);
    }

    let mut reactions: HashMap<&str, Vec<ReactionResponse>> = HashMap::new();
    for r in &reaction_rows {
        reactions
            .entry(r.message_id.as_str())
            .or_default()
            .push(reaction_response(r, &users));
    }

    Ok(rows
        .iter()
        .map(|row| {
            let sender = users
                .get(&row.sender_id)
                .map(user_response)
                .unwrap_or_else(|| unknown_user(&row.sender_id));
            let status = counts
                .get(&row.id)
                .copied()
                .map(ReceiptCounts::status)
                .unwrap_or(MessageStatus::Sent);
            let reactions = reactions.remove(row.id.as_str()).unwrap_or_default();
            message_response(row, sender, status, reactions)
        })
        .collect())
}

/// One message with its sender, reactions and a freshly resolved status.
fn load_message(db: &Database, row: &MessageRow) -> Result<MessageResponse, ApiError> {
    let reaction_rows = db.get_reactions_for_message(&row.id)?;

    let mut ids: Vec<String> = reaction_rows.iter().map(|r| r.user_id.clone()).collect();
    ids.push(row.sender_id.clone());
    ids.sort();
    ids.dedup();
    let users: HashMap<String, UserRow> = db
        .get_users_by_ids(&ids)?
        .into_iter()
        .map(|u| (u.id.clone(), u))
        .collect();

    let sender = users
        .get(&row.sender_id)
        .map(user_response)
        .unwrap_or_else(|| unknown_user(&row.sender_id));
    let status = db.resolve_status(&row.id)?.unwrap_or(row.status);
    let reactions = reaction_rows.iter().map(|r| reaction_response(r, &users)).collect();
    Ok(message_response(row, sender, status, reactions))
}

/// The message, provided it belongs to `conversation_id`.
fn message_in(db: &Database, conversation_id: &str, message_id: &str) -> Result<MessageRow, ApiError> {
    db.get_message(message_id)?
        .filter(|m| m.conversation_id == conversation_id)
        .ok_or_else(|| ApiError::not_found("message not found"))
}

fn require_participant(db: &Database, conversation_id: &str, user_id: &str) -> Result<ConversationRow, ApiError> {
    let not_found = || ApiError::not_found("conversation not found");
    if !db.is_participant(conversation_id, user_id)? {
        return Err(not_found());
    }
    db.get_conversation(conversation_id)?.ok_or_else(not_found)
}
