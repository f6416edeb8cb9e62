//! Database row types. These map directly to SQLite rows and stay
//! independent of the wasa-types API models.

use wasa_types::models::{ContentKind, ConversationKind, MessageStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub photo_url: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: String,
    pub kind: ConversationKind,
    pub name: Option<String>,
    pub photo_url: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
}

/// A conversation as listed for one user, with the latest message folded in.
/// `peer_*` is the first other participant, used to title direct chats.
#[derive(Debug, Clone)]
pub struct ConversationSummaryRow {
    pub id: String,
    pub kind: ConversationKind,
    pub name: Option<String>,
    pub photo_url: Option<String>,
    pub peer_name: Option<String>,
    pub peer_photo_url: Option<String>,
    pub last_message_at: Option<String>,
    pub last_message_text: Option<String>,
    pub last_message_kind: Option<ContentKind>,
    pub last_message_status: Option<MessageStatus>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub created_at: String,
    pub content_type: ContentKind,
    pub text: Option<String>,
    pub photo_url: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub replied_to_message_id: Option<String>,
    /// Last known status. A hint for list views only; resolve fresh from
    /// the marker tables wherever precision matters.
    pub status: MessageStatus,
    pub is_forwarded: bool,
    pub client_message_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReactionRow {
    pub id: String,
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
    pub created_at: String,
}
