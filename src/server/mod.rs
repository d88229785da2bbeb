//! HTTP server for chat inference
//!
//! Submission and collection are decoupled: `POST /chat` queues a job and
//! returns its id, `GET /chat-result/:id` hands the result over once.

mod handlers;
mod routes;

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;

pub use handlers::{ApiError, AppState, ChatRequest, IDENTITY_HEADER};
pub use routes::api_routes;

/// Build the application router with its middleware
pub fn router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let mut app = Router::new()
        .merge(api_routes())
        .layer(RequestBodyLimitLayer::new(config.max_body_size));

    if config.cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }
    if config.request_logging {
        app = app.layer(TraceLayer::new_for_http());
    }

    app.with_state(state)
}

/// Start the HTTP server
pub async fn start(state: Arc<AppState>, config: ServerConfig) -> Result<()> {
    let app = router(state, &config);

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  GET  /health - Health check");
    tracing::info!("  POST /chat - Queue a chat inference job");
    tracing::info!("  GET  /chat-result/:request_id - Collect a finished result");

    axum::serve(listener, app).await?;

    Ok(())
}
