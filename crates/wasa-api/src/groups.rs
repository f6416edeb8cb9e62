use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use wasa_types::api::{AddToGroupRequest, CreateGroupRequest, SetGroupNameRequest, SetPhotoRequest};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::CurrentUser;

pub async fn create_group(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    payload: Result<Json<CreateGroupRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let group = state.service.create_group(&user, &req.name, req.member_ids).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn get_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let group = state.service.get_group(&user, &group_id).await?;
    Ok(Json(group))
}

pub async fn add_to_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    payload: Result<Json<AddToGroupRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let group = state.service.add_member(&user, &group_id, &req.user_id).await?;
    Ok(Json(group))
}

pub async fn leave_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<StatusCode, ApiError> {
    state.service.leave_group(&user, &group_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_group_name(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    payload: Result<Json<SetGroupNameRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let group = state.service.rename_group(&user, &group_id, &req.name).await?;
    Ok(Json(group))
}

pub async fn set_group_photo(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    payload: Result<Json<SetPhotoRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let group = state
        .service
        .set_group_photo(&user, &group_id, &req.photo_url)
        .await?;
    Ok(Json(group))
}
