use tracing::info;
use uuid::Uuid;

use wasa_db::models::UserRow;
use wasa_types::api::UserResponse;
use wasa_types::events::PushEvent;

use super::{ConversationService, user_response, validate};
use crate::error::ApiError;

impl ConversationService {
    /// Log in by name, creating the account on first use. The bool is `true`
    /// when the account was created by this call.
    pub async fn login(&self, name: &str) -> Result<(UserRow, bool), ApiError> {
        let name = validate::username(name)?;

        self.blocking(move |db| {
            if let Some(user) = db.get_user_by_name(&name)? {
                return Ok((user, false));
            }

            let id = Uuid::new_v4().to_string();
            db.create_user(&id, &name)?;
            let user = db
                .get_user_by_id(&id)?
                .ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", id))?;
            info!("Created user {} ({})", user.name, user.id);
            Ok((user, true))
        })
        .await
    }

    pub async fn find_user(&self, id: &str) -> Result<Option<UserRow>, ApiError> {
        let id = id.to_string();
        self.blocking(move |db| Ok(db.get_user_by_id(&id)?)).await
    }

    pub async fn set_username(&self, caller: &UserRow, name: &str) -> Result<UserResponse, ApiError> {
        let name = validate::username(name)?;
        let user_id = caller.id.clone();

        let (user, contacts) = self
            .blocking(move |db| {
                if let Some(holder) = db.get_user_by_name(&name)? {
                    if holder.id != user_id {
                        return Err(ApiError::Conflict(format!("name '{}' is already taken", name)));
                    }
                }
                db.update_username(&user_id, &name)?;
                let user = db
                    .get_user_by_id(&user_id)?
                    .ok_or_else(|| ApiError::not_found("user not found"))?;
                Ok((user, db.get_contact_ids(&user_id)?))
            })
            .await?;

        info!("{} renamed to {}", user.id, user.name);
        self.broadcaster.notify(
            contacts,
            &PushEvent::ProfileUpdated {
                user_id: user.id.clone(),
                name: Some(user.name.clone()),
                photo_url: None,
            },
        );
        Ok(user_response(&user))
    }

    pub async fn set_photo(&self, caller: &UserRow, photo_url: &str) -> Result<UserResponse, ApiError> {
        let photo_url = validate::photo_url(photo_url)?;
        let user_id = caller.id.clone();

        let (user, contacts) = self
            .blocking(move |db| {
                db.update_user_photo(&user_id, Some(&photo_url))?;
                let user = db
                    .get_user_by_id(&user_id)?
                    .ok_or_else(|| ApiError::not_found("user not found"))?;
                Ok((user, db.get_contact_ids(&user_id)?))
            })
            .await?;

        self.broadcaster.notify(
            contacts,
            &PushEvent::ProfileUpdated {
                user_id: user.id.clone(),
                name: None,
                photo_url: user.photo_url.clone(),
            },
        );
        Ok(user_response(&user))
    }

    pub async fn search_users(&self, query: Option<String>) -> Result<Vec<UserResponse>, ApiError> {
        self.blocking(move |db| {
            let users = db.search_users(query.as_deref())?;
            Ok(users.iter().map(user_response).collect())
        })
        .await
    }
}
