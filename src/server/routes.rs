//! Route definitions

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{chat, chat_result, health, AppState};

/// Create the API router
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Submit, then poll
        .route("/chat", post(chat))
        .route("/chat-result/:request_id", get(chat_result))
}
