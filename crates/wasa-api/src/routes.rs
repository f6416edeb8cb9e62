use axum::{
    Router,
    extract::{
        DefaultBodyLimit, Query, State, WebSocketUpgrade,
        ws::rejection::WebSocketUpgradeRejection,
    },
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde::Deserialize;
use tracing::debug;

use wasa_gateway::connection;

use crate::auth::{self, AppState, authenticate};
use crate::error::ApiError;
use crate::middleware::require_auth;
use crate::{conversations, files, groups, messages, reactions, users};

#[derive(Debug, Deserialize)]
pub struct PushQuery {
    pub token: Option<String>,
}

/// The full HTTP surface. Everything except the session, liveness, upload
/// download and push routes sits behind `require_auth`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/session", post(auth::session))
        .route("/liveness", get(liveness))
        .route("/uploads/{file}", get(files::serve_upload))
        .route("/ws", get(ws_upgrade));

    let protected_routes = Router::new()
        .route("/me", get(users::get_me))
        .route("/me/username", put(users::set_username))
        .route("/me/photo", put(users::set_photo))
        .route("/users", get(users::search_users))
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route("/conversations/{conversation_id}", get(conversations::get_conversation))
        .route("/conversations/{conversation_id}/messages", post(messages::send_message))
        .route(
            "/conversations/{conversation_id}/messages/{message_id}",
            delete(messages::delete_message),
        )
        .route(
            "/conversations/{conversation_id}/messages/{message_id}/forward",
            post(messages::forward_message),
        )
        .route(
            "/conversations/{conversation_id}/messages/{message_id}/comments",
            post(reactions::comment_message),
        )
        .route(
            "/conversations/{conversation_id}/messages/{message_id}/comments/{reaction_id}",
            delete(reactions::uncomment_message),
        )
        .route("/groups", post(groups::create_group))
        .route("/groups/{group_id}", get(groups::get_group))
        .route("/groups/{group_id}/members", post(groups::add_to_group))
        .route("/groups/{group_id}/members/me", delete(groups::leave_group))
        .route("/groups/{group_id}/name", put(groups::set_group_name))
        .route("/groups/{group_id}/photo", put(groups::set_group_photo))
        .route(
            files::UPLOAD_ROUTE,
            post(files::upload).layer(DefaultBodyLimit::max(files::MAX_UPLOAD_SIZE)),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /ws?token=<bearer>. The token is checked before the upgrade.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<PushQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let token = query.token.ok_or(ApiError::Unauthorized)?;
    let user = authenticate(&state, &token).await?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!("Push upgrade by {} rejected: {}", user.id, rejection.body_text());
            return Ok(rejection.into_response());
        }
    };

    let registry = state.service.registry().clone();
    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, registry, user.id, user.name)))
}
