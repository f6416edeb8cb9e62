use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use wasa_types::api::{ForwardMessageRequest, SendMessageRequest};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::CurrentUser;

/// POST /conversations/{id}/messages returns 201 for a new message, 200 when a
/// retry with a known `clientMessageId` returns the stored one.
pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let outcome = state.service.send_message(&user, &conversation_id, req).await?;
    let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(outcome.message)))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path((conversation_id, message_id)): Path<(String, String)>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_message(&user, &conversation_id, &message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn forward_message(
    State(state): State<AppState>,
    Path((conversation_id, message_id)): Path<(String, String)>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    payload: Result<Json<ForwardMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let message = state
        .service
        .forward_message(&user, &conversation_id, &message_id, &req.target_conversation_id)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
