use axum::{
    Extension, Json,
    extract::{Query, State, rejection::{JsonRejection, QueryRejection}},
    response::IntoResponse,
};

use wasa_types::api::{SearchUsersQuery, SearchUsersResponse, SetPhotoRequest, SetUsernameRequest};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::service;

pub async fn get_me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> impl IntoResponse {
    Json(service::user_response(&user))
}

pub async fn set_username(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    payload: Result<Json<SetUsernameRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let updated = state.service.set_username(&user, &req.name).await?;
    Ok(Json(updated))
}

pub async fn set_photo(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    payload: Result<Json<SetPhotoRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let updated = state.service.set_photo(&user, &req.photo_url).await?;
    Ok(Json(updated))
}

pub async fn search_users(
    State(state): State<AppState>,
    query: Result<Query<SearchUsersQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let users = state.service.search_users(query.q).await?;
    Ok(Json(SearchUsersResponse { users }))
}
