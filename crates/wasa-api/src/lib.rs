pub mod auth;
pub mod conversations;
pub mod error;
pub mod files;
pub mod groups;
pub mod messages;
pub mod middleware;
pub mod reactions;
pub mod routes;
pub mod service;
pub mod users;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;
pub use service::ConversationService;
