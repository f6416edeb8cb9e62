use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};

use wasa_db::models::UserRow;

use crate::auth::{AppState, authenticate};
use crate::error::ApiError;

/// The authenticated caller, inserted by `require_auth`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRow);

/// Validate the bearer token and attach the caller's user row to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.map_err(|_| ApiError::Unauthorized)?;
    let user = authenticate(&state, bearer.token()).await?;

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}
