use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Duration;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{debug, info};

use wasa_db::models::UserRow;
use wasa_types::api::{Claims, LoginRequest, LoginResponse};

use crate::error::ApiError;
use crate::service::ConversationService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub service: ConversationService,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    /// Where uploaded photos are written and served from
    pub upload_dir: PathBuf,
}

/// POST /session: log in by name, creating the user on first use.
pub async fn session(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let (user, created) = state.service.login(&req.name).await?;
    if created {
        info!("New user {} ({})", user.name, user.id);
    } else {
        debug!("{} ({}) logged in", user.name, user.id);
    }

    let token = create_token(&state.jwt_secret, &user.id, state.token_ttl)?;

    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            identifier: user.id,
            token,
        }),
    ))
}

pub fn create_token(secret: &str, user_id: &str, ttl: Duration) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn decode_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        debug!("Rejected token: {}", e);
        ApiError::Unauthorized
    })
}

/// Resolve a bearer token to its user. A valid token for a user that no
/// longer exists is rejected too.
pub async fn authenticate(state: &AppStateInner, token: &str) -> Result<UserRow, ApiError> {
    let claims = decode_token(&state.jwt_secret, token)?;
    state
        .service
        .find_user(&claims.sub)
        .await?
        .ok_or(ApiError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_roundtrip() {
        let token = create_token("secret", "user-1", Duration::days(1)).unwrap();
        let claims = decode_token("secret", &token).unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let token = create_token("secret", "user-1", Duration::days(1)).unwrap();
        assert!(matches!(decode_token("other", &token), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let token = create_token("secret", "user-1", Duration::days(-1)).unwrap();
        assert!(matches!(decode_token("secret", &token), Err(ApiError::Unauthorized)));
    }
}
