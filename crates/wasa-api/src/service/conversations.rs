use tracing::debug;
use uuid::Uuid;

use wasa_db::models::{ConversationSummaryRow, UserRow};
use wasa_types::api::{ConversationResponse, ConversationSummaryResponse};
use wasa_types::events::PushEvent;
use wasa_types::models::{ContentKind, ConversationKind, MessageStatus, now_timestamp};

use super::{ConversationService, SELF_CONVERSATION_TITLE, load_conversation, require_participant, snippet, stored_time};
use crate::error::ApiError;

impl ConversationService {
    /// Return the caller's direct conversation with `other_id`, creating it
    /// on first contact. `other_id` may be the caller (self-conversation).
    /// The bool is `true` when the conversation was created by this call.
    pub async fn start_direct(
        &self,
        caller: &UserRow,
        other_id: &str,
    ) -> Result<(ConversationResponse, bool), ApiError> {
        let caller_id = caller.id.clone();
        let other_id = other_id.trim().to_string();
        if other_id.is_empty() {
            return Err(ApiError::validation("userId is required"));
        }

        let (mine, theirs, created) = self
            .blocking(move |db| {
                if db.get_user_by_id(&other_id)?.is_none() {
                    return Err(ApiError::not_found("user not found"));
                }

                let id = Uuid::new_v4().to_string();
                let (conv, created) = db.find_or_create_direct(&id, &caller_id, &other_id, &now_timestamp())?;

                let mine = load_conversation(db, &conv, &caller_id, false)?;
                let theirs = if created && other_id != caller_id {
                    Some((other_id.clone(), load_conversation(db, &conv, &other_id, false)?))
                } else {
                    None
                };
                Ok((mine, theirs, created))
            })
            .await?;

        if created {
            debug!("{} started direct conversation {}", caller.id, mine.id);
            self.broadcaster
                .notify([caller.id.as_str()], &PushEvent::NewConversation(mine.clone()));
            if let Some((peer_id, view)) = theirs {
                self.broadcaster.notify([peer_id], &PushEvent::NewConversation(view));
            }
        }

        Ok((mine, created))
    }

    /// The caller's conversation list. Fetching it counts as delivery of
    /// every pending message addressed to the caller.
    pub async fn list_conversations(&self, caller: &UserRow) -> Result<Vec<ConversationSummaryResponse>, ApiError> {
        let caller_id = caller.id.clone();
        let caller_photo = caller.photo_url.clone();

        self.blocking(move |db| {
            db.mark_delivered_for_user(&caller_id, &now_timestamp())?;
            let rows = db.get_conversation_summaries(&caller_id)?;
            Ok(rows
                .into_iter()
                .map(|row| summary_response(row, caller_photo.as_deref()))
                .collect())
        })
        .await
    }

    /// Open a conversation: everything from others becomes read by the
    /// caller, and the other participants learn which of their messages are
    /// now read by everyone.
    pub async fn open_conversation(
        &self,
        caller: &UserRow,
        conversation_id: &str,
    ) -> Result<ConversationResponse, ApiError> {
        let caller_id = caller.id.clone();
        let conversation_id = conversation_id.to_string();

        let (view, changes, others) = self
            .blocking(move |db| {
                let conv = require_participant(db, &conversation_id, &caller_id)?;
                let changes = db.mark_conversation_read(&conv.id, &caller_id, &now_timestamp())?;
                let view = load_conversation(db, &conv, &caller_id, true)?;
                let others: Vec<String> = db
                    .get_participant_ids(&conv.id)?
                    .into_iter()
                    .filter(|id| *id != caller_id)
                    .collect();
                Ok((view, changes, others))
            })
            .await?;

        if !changes.is_empty() {
            let fully_read_message_ids: Vec<String> = changes
                .into_iter()
                .filter(|c| c.reached(MessageStatus::Read))
                .map(|c| c.message_id)
                .collect();
            self.broadcaster.notify(
                others,
                &PushEvent::MessagesRead {
                    conversation_id: view.id.clone(),
                    read_by_user_id: caller.id.clone(),
                    fully_read_message_ids,
                },
            );
        }

        Ok(view)
    }
}

fn summary_response(row: ConversationSummaryRow, caller_photo: Option<&str>) -> ConversationSummaryResponse {
    let (title, photo_url) = match row.kind {
        ConversationKind::Group => (row.name.unwrap_or_default(), row.photo_url),
        ConversationKind::Direct => match row.peer_name {
            Some(peer) => (peer, row.peer_photo_url),
            None => (SELF_CONVERSATION_TITLE.to_string(), caller_photo.map(str::to_string)),
        },
    };

    let last_message_snippet = row
        .last_message_kind
        .and_then(|kind| snippet(kind, row.last_message_text.as_deref()));

    ConversationSummaryResponse {
        last_message_at: row
            .last_message_at
            .as_deref()
            .map(|raw| stored_time(raw, &format!("last message of {}", row.id))),
        id: row.id,
        kind: row.kind,
        title,
        photo_url,
        last_message_snippet,
        last_message_is_photo: row.last_message_kind == Some(ContentKind::Photo),
        last_message_status: row.last_message_status,
    }
}
