use std::collections::HashMap;

use uuid::Uuid;

use wasa_db::models::UserRow;
use wasa_types::api::ReactionResponse;
use wasa_types::events::PushEvent;
use wasa_types::models::now_timestamp;

use super::{ConversationService, message_in, reaction_response, require_participant, validate};
use crate::error::ApiError;

impl ConversationService {
    /// Set the caller's reaction on a message. An earlier reaction by the
    /// caller on the same message is replaced.
    pub async fn react(
        &self,
        caller: &UserRow,
        conversation_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<ReactionResponse, ApiError> {
        validate::emoji(emoji)?;

        let caller_row = caller.clone();
        let conversation_id = conversation_id.to_string();
        let message_id = message_id.to_string();
        let emoji = emoji.to_string();

        let (reaction, replaced, conversation_id, message_id, participants) = self
            .blocking(move |db| {
                let conv = require_participant(db, &conversation_id, &caller_row.id)?;
                let message = message_in(db, &conv.id, &message_id)?;

                let id = Uuid::new_v4().to_string();
                let replaced = db.replace_reaction(&id, &message.id, &caller_row.id, &emoji, &now_timestamp())?;
                let row = db
                    .get_reaction(&id)?
                    .ok_or_else(|| anyhow::anyhow!("reaction {} vanished after insert", id))?;

                let users = HashMap::from([(caller_row.id.clone(), caller_row)]);
                Ok((
                    reaction_response(&row, &users),
                    replaced,
                    conv.id.clone(),
                    message.id,
                    db.get_participant_ids(&conv.id)?,
                ))
            })
            .await?;

        if let Some(old) = replaced {
            self.broadcaster.notify(
                participants.iter().map(String::as_str),
                &PushEvent::ReactionRemoved {
                    conversation_id: conversation_id.clone(),
                    message_id: message_id.clone(),
                    reaction_id: old.id,
                    user_id: old.user_id,
                },
            );
        }
        self.broadcaster.notify(
            participants,
            &PushEvent::ReactionAdded {
                conversation_id,
                message_id,
                reaction: reaction.clone(),
            },
        );

        Ok(reaction)
    }

    /// Remove one of the caller's own reactions.
    pub async fn unreact(
        &self,
        caller: &UserRow,
        conversation_id: &str,
        message_id: &str,
        reaction_id: &str,
    ) -> Result<(), ApiError> {
        let caller_id = caller.id.clone();
        let conversation_id = conversation_id.to_string();
        let message_id = message_id.to_string();
        let reaction_id = reaction_id.to_string();

        let (reaction, conversation_id, participants) = self
            .blocking(move |db| {
                let conv = require_participant(db, &conversation_id, &caller_id)?;
                let message = message_in(db, &conv.id, &message_id)?;
                let reaction = db
                    .get_reaction(&reaction_id)?
                    .filter(|r| r.message_id == message.id)
                    .ok_or_else(|| ApiError::not_found("reaction not found"))?;
                if reaction.user_id != caller_id {
                    return Err(ApiError::forbidden("you can only remove your own reactions"));
                }
                db.delete_reaction(&reaction.id)?;
                Ok((reaction, conv.id.clone(), db.get_participant_ids(&conv.id)?))
            })
            .await?;

        self.broadcaster.notify(
            participants,
            &PushEvent::ReactionRemoved {
                conversation_id,
                message_id: reaction.message_id,
                reaction_id: reaction.id,
                user_id: reaction.user_id,
            },
        );
        Ok(())
    }
}
