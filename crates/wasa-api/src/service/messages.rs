use tracing::{debug, info};
use uuid::Uuid;

use wasa_db::models::{MessageRow, UserRow};
use wasa_types::api::{MessageResponse, SendMessageRequest};
use wasa_types::events::PushEvent;
use wasa_types::models::{ContentKind, MessageStatus, now_timestamp};

use super::{
    ConversationService, load_message, message_in, message_response, require_participant, snippet, user_response,
    validate,
};
use crate::error::ApiError;

/// Result of a send. `created` is `false` when a retry with the same
/// `clientMessageId` returned the message stored by an earlier attempt.
#[derive(Debug)]
pub struct SendOutcome {
    pub message: MessageResponse,
    pub created: bool,
}

impl ConversationService {
    pub async fn send_message(
        &self,
        caller: &UserRow,
        conversation_id: &str,
        req: SendMessageRequest,
    ) -> Result<SendOutcome, ApiError> {
        let caller_id = caller.id.clone();
        let conversation_id = conversation_id.to_string();

        let (row, participants, replay) = self
            .blocking(move |db| {
                let conv = require_participant(db, &conversation_id, &caller_id)?;
                let kind = validate::content(&req)?;

                let client_message_id = non_empty(req.client_message_id);
                if let Some(key) = &client_message_id {
                    if let Some(existing) = db.find_message_by_client_id(&caller_id, &conv.id, key)? {
                        let replay = load_message(db, &existing)?;
                        return Ok((existing, Vec::new(), Some(replay)));
                    }
                }

                let replied_to_message_id = non_empty(req.reply_to_message_id);
                if let Some(target) = &replied_to_message_id {
                    if message_in(db, &conv.id, target).is_err() {
                        return Err(ApiError::validation(
                            "repliedToMessageId must reference a message in this conversation",
                        ));
                    }
                }

                let row = MessageRow {
                    id: Uuid::new_v4().to_string(),
                    conversation_id: conv.id.clone(),
                    sender_id: caller_id,
                    created_at: now_timestamp(),
                    content_type: kind,
                    text: non_empty(req.text),
                    photo_url: non_empty(req.photo_url),
                    file_url: non_empty(req.file_url),
                    file_name: non_empty(req.file_name),
                    replied_to_message_id,
                    status: MessageStatus::Sent,
                    is_forwarded: false,
                    client_message_id,
                };
                db.insert_message(&row)?;

                Ok((row, db.get_participant_ids(&conv.id)?, None))
            })
            .await?;

        if let Some(message) = replay {
            debug!("Replayed message {} for {}", message.id, caller.id);
            return Ok(SendOutcome {
                message,
                created: false,
            });
        }

        let message = message_response(&row, user_response(caller), MessageStatus::Sent, Vec::new());
        self.announce_message(participants, &message);
        Ok(SendOutcome { message, created: true })
    }

    /// Copy a message into another conversation the caller belongs to.
    /// Status, reactions and the reply reference are not carried over.
    pub async fn forward_message(
        &self,
        caller: &UserRow,
        conversation_id: &str,
        message_id: &str,
        target_conversation_id: &str,
    ) -> Result<MessageResponse, ApiError> {
        let caller_id = caller.id.clone();
        let conversation_id = conversation_id.to_string();
        let message_id = message_id.to_string();
        let target_conversation_id = target_conversation_id.trim().to_string();
        if target_conversation_id.is_empty() {
            return Err(ApiError::validation("targetConversationId is required"));
        }

        let (row, participants) = self
            .blocking(move |db| {
                let source = require_participant(db, &conversation_id, &caller_id)?;
                let original = message_in(db, &source.id, &message_id)?;
                let target = require_participant(db, &target_conversation_id, &caller_id)?;

                let row = MessageRow {
                    id: Uuid::new_v4().to_string(),
                    conversation_id: target.id.clone(),
                    sender_id: caller_id,
                    created_at: now_timestamp(),
                    content_type: original.content_type,
                    text: original.text,
                    photo_url: original.photo_url,
                    file_url: original.file_url,
                    file_name: original.file_name,
                    replied_to_message_id: None,
                    status: MessageStatus::Sent,
                    is_forwarded: true,
                    client_message_id: None,
                };
                db.insert_message(&row)?;

                Ok((row, db.get_participant_ids(&target.id)?))
            })
            .await?;

        let message = message_response(&row, user_response(caller), MessageStatus::Sent, Vec::new());
        self.announce_message(participants, &message);
        Ok(message)
    }

    /// Hard delete, sender only.
    pub async fn delete_message(
        &self,
        caller: &UserRow,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<(), ApiError> {
        let caller_id = caller.id.clone();
        let conversation_id = conversation_id.to_string();
        let message_id = message_id.to_string();

        let (conversation_id, message_id, participants) = self
            .blocking(move |db| {
                let conv = require_participant(db, &conversation_id, &caller_id)?;
                let message = message_in(db, &conv.id, &message_id)?;
                if message.sender_id != caller_id {
                    return Err(ApiError::forbidden("only the sender can delete a message"));
                }
                db.delete_message(&message.id)?;
                Ok((conv.id.clone(), message.id, db.get_participant_ids(&conv.id)?))
            })
            .await?;

        info!("{} deleted message {} in {}", caller.id, message_id, conversation_id);
        self.broadcaster.notify(
            participants,
            &PushEvent::MessageDeleted {
                conversation_id,
                message_id,
            },
        );
        Ok(())
    }

    /// Push a freshly stored message to every participant, the sender's
    /// other sessions included.
    fn announce_message(&self, participants: Vec<String>, message: &MessageResponse) {
        let updated = PushEvent::ConversationUpdated {
            conversation_id: message.conversation_id.clone(),
            last_message_snippet: snippet(message.content_type, message.text.as_deref()),
            last_message_is_photo: message.content_type == ContentKind::Photo,
            last_message_at: message.created_at,
        };
        self.broadcaster
            .notify(participants.iter().map(String::as_str), &PushEvent::NewMessage(message.clone()));
        self.broadcaster.notify(participants, &updated);
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
