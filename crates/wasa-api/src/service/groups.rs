use tracing::info;
use uuid::Uuid;

use wasa_db::Database;
use wasa_db::models::{ConversationRow, UserRow};
use wasa_types::api::GroupResponse;
use wasa_types::events::PushEvent;
use wasa_types::models::{ConversationKind, now_timestamp};

use super::{ConversationService, load_conversation, require_participant, user_response, validate};
use crate::error::ApiError;

impl ConversationService {
    /// Create a group with the caller and `member_ids` in it. Every member
    /// gets a `new_conversation` push.
    pub async fn create_group(
        &self,
        caller: &UserRow,
        name: &str,
        member_ids: Vec<String>,
    ) -> Result<GroupResponse, ApiError> {
        let name = validate::group_name(name)?;
        let caller_id = caller.id.clone();

        let (group, view, members) = self
            .blocking(move |db| {
                let mut members: Vec<String> = member_ids
                    .into_iter()
                    .map(|id| id.trim().to_string())
                    .filter(|id| !id.is_empty() && *id != caller_id)
                    .collect();
                members.sort();
                members.dedup();

                let found = db.get_users_by_ids(&members)?;
                if let Some(missing) = members.iter().find(|id| !found.iter().any(|u| &u.id == *id)) {
                    return Err(ApiError::not_found(format!("user {} not found", missing)));
                }

                let id = Uuid::new_v4().to_string();
                db.create_group(&id, &name, &caller_id, &members, &now_timestamp())?;

                let conv = require_group(db, &id, &caller_id)?;
                let view = load_conversation(db, &conv, &caller_id, false)?;
                Ok((group_response(db, &conv)?, view, db.get_participant_ids(&id)?))
            })
            .await?;

        info!("{} created group {} with {} member(s)", caller.id, group.id, group.members.len());
        self.broadcaster.notify(members, &PushEvent::NewConversation(view));
        Ok(group)
    }

    pub async fn get_group(&self, caller: &UserRow, group_id: &str) -> Result<GroupResponse, ApiError> {
        let caller_id = caller.id.clone();
        let group_id = group_id.to_string();

        self.blocking(move |db| {
            let conv = require_group(db, &group_id, &caller_id)?;
            group_response(db, &conv)
        })
        .await
    }

    /// Add a user to a group the caller belongs to. Adding an existing
    /// member changes nothing.
    pub async fn add_member(&self, caller: &UserRow, group_id: &str, user_id: &str) -> Result<GroupResponse, ApiError> {
        let caller_id = caller.id.clone();
        let group_id = group_id.to_string();
        let user_id = user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(ApiError::validation("userId is required"));
        }

        let (group, added) = self
            .blocking(move |db| {
                let conv = require_group(db, &group_id, &caller_id)?;
                if db.get_user_by_id(&user_id)?.is_none() {
                    return Err(ApiError::not_found("user not found"));
                }

                let added = if db.add_participant(&conv.id, &user_id, &now_timestamp())? {
                    Some((user_id.clone(), load_conversation(db, &conv, &user_id, false)?))
                } else {
                    None
                };
                Ok((group_response(db, &conv)?, added))
            })
            .await?;

        if let Some((new_member, view)) = added {
            info!("{} added {} to group {}", caller.id, new_member, group.id);
            self.broadcaster
                .notify([new_member.as_str()], &PushEvent::NewConversation(view));
            self.announce_group(&group);
        }
        Ok(group)
    }

    pub async fn leave_group(&self, caller: &UserRow, group_id: &str) -> Result<(), ApiError> {
        let caller_id = caller.id.clone();
        let group_id = group_id.to_string();

        self.blocking(move |db| {
            let conv = require_group(db, &group_id, &caller_id)?;
            db.remove_participant(&conv.id, &caller_id)?;
            info!("{} left group {}", caller_id, conv.id);
            Ok(())
        })
        .await
    }

    pub async fn rename_group(&self, caller: &UserRow, group_id: &str, name: &str) -> Result<GroupResponse, ApiError> {
        let name = validate::group_name(name)?;
        let caller_id = caller.id.clone();
        let group_id = group_id.to_string();

        let group = self
            .blocking(move |db| {
                let conv = require_group(db, &group_id, &caller_id)?;
                db.update_conversation_name(&conv.id, &name)?;
                let conv = require_group(db, &conv.id, &caller_id)?;
                group_response(db, &conv)
            })
            .await?;

        self.announce_group(&group);
        Ok(group)
    }

    pub async fn set_group_photo(
        &self,
        caller: &UserRow,
        group_id: &str,
        photo_url: &str,
    ) -> Result<GroupResponse, ApiError> {
        let photo_url = validate::photo_url(photo_url)?;
        let caller_id = caller.id.clone();
        let group_id = group_id.to_string();

        let group = self
            .blocking(move |db| {
                let conv = require_group(db, &group_id, &caller_id)?;
                db.update_conversation_photo(&conv.id, Some(&photo_url))?;
                let conv = require_group(db, &conv.id, &caller_id)?;
                group_response(db, &conv)
            })
            .await?;

        self.announce_group(&group);
        Ok(group)
    }

    fn announce_group(&self, group: &GroupResponse) {
        self.broadcaster.notify(
            group.members.iter().map(|m| m.id.as_str()),
            &PushEvent::GroupUpdated {
                group_id: group.id.clone(),
                name: group.name.clone(),
                photo_url: group.photo_url.clone(),
            },
        );
    }
}

/// The group, if the caller is one of its members.
fn require_group(db: &Database, group_id: &str, user_id: &str) -> Result<ConversationRow, ApiError> {
    let conv = require_participant(db, group_id, user_id)?;
    if conv.kind != ConversationKind::Group {
        return Err(ApiError::not_found("group not found"));
    }
    Ok(conv)
}

fn group_response(db: &Database, conv: &ConversationRow) -> Result<GroupResponse, ApiError> {
    let members = db.get_participants(&conv.id)?;
    Ok(GroupResponse {
        id: conv.id.clone(),
        name: conv.name.clone().unwrap_or_default(),
        photo_url: conv.photo_url.clone(),
        created_by: conv.created_by.clone(),
        members: members.iter().map(user_response).collect(),
    })
}
