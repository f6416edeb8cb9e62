use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use wasa_types::api::ReactRequest;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::CurrentUser;

/// POST /conversations/{id}/messages/{mid}/comments replaces any earlier
/// reaction by the caller on that message.
pub async fn comment_message(
    State(state): State<AppState>,
    Path((conversation_id, message_id)): Path<(String, String)>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    payload: Result<Json<ReactRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let reaction = state
        .service
        .react(&user, &conversation_id, &message_id, &req.emoji)
        .await?;
    Ok((StatusCode::CREATED, Json(reaction)))
}

pub async fn uncomment_message(
    State(state): State<AppState>,
    Path((conversation_id, message_id, reaction_id)): Path<(String, String, String)>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<StatusCode, ApiError> {
    state
        .service
        .unreact(&user, &conversation_id, &message_id, &reaction_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
