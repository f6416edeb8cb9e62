pub mod config;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use wasa_api::{AppState, AppStateInner, ConversationService, routes};
use wasa_db::Database;
use wasa_gateway::{Broadcaster, ConnectionRegistry};

use crate::config::Config;

/// Wire the store, registry, broadcaster and service together.
pub fn build_state(config: &Config, db: Database) -> AppState {
    let registry = ConnectionRegistry::new();
    let broadcaster = Broadcaster::new(registry);
    let service = ConversationService::new(Arc::new(db), broadcaster);

    Arc::new(AppStateInner {
        service,
        jwt_secret: config.jwt_secret.clone(),
        token_ttl: config.token_ttl,
        upload_dir: config.upload_dir.clone(),
    })
}

pub fn app(state: AppState) -> Router {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
