//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::engine::{Engine, InferenceRequest, PollOutcome, RequestId, Turn};
use crate::error::EngineError;
use crate::registry::ModelRegistry;

/// Header carrying the authenticated caller
pub const IDENTITY_HEADER: &str = "x-user-id";

/// Shared application state
pub struct AppState {
    pub engine: Engine,
    pub registry: Arc<dyn ModelRegistry>,
}

impl AppState {
    pub fn new(engine: Engine, registry: Arc<dyn ModelRegistry>) -> Self {
        Self { engine, registry }
    }
}

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            pending_jobs: state.engine.pending(),
            queue_capacity: state.engine.capacity(),
        }),
    )
}

/// Queue a chat inference job
pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    let Some(identity) = identity(&headers) else {
        return error_response(StatusCode::UNAUTHORIZED, format!("missing {IDENTITY_HEADER} header"));
    };

    if request.model_name.trim().is_empty() {
        return ApiError(EngineError::invalid_request("model_name is required")).into_response();
    }
    if request.input_text.trim().is_empty() {
        return ApiError(EngineError::invalid_request("input_text is required")).into_response();
    }

    let model = match state
        .registry
        .resolve(&identity, &request.model_name, request.is_shared_access)
    {
        Ok(model) => model,
        Err(e) => return ApiError(e).into_response(),
    };

    let job = InferenceRequest {
        request_id: RequestId::new(),
        model_location: model.location,
        display_name: model.display_name,
        input_text: request.input_text,
        identity,
        session_history: request.session_history,
    };

    match state.engine.submit(job) {
        Ok(request_id) => (
            StatusCode::OK,
            Json(QueuedResponse {
                status: "queued",
                request_id,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Rejected chat submission");
            ApiError(e).into_response()
        }
    }
}

/// Collect a chat result; each result is returned once
pub async fn chat_result(State(state): State<Arc<AppState>>, Path(request_id): Path<String>) -> Response {
    match state.engine.poll(&RequestId::from(request_id)) {
        PollOutcome::Ready(result) => (StatusCode::OK, Json(result)).into_response(),
        PollOutcome::Pending => (
            StatusCode::ACCEPTED,
            Json(PendingResponse {
                status: "pending",
                message: "Request is still processing",
            }),
        )
            .into_response(),
    }
}

fn identity(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDENTITY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Engine errors as HTTP responses
pub struct ApiError(pub EngineError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::QueueFull => StatusCode::TOO_MANY_REQUESTS,
            EngineError::WorkerStopped => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            EngineError::ModelNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, self.0.to_string())
    }
}

// Request/Response types

#[derive(Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub is_shared_access: bool,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub input_text: String,
    #[serde(default)]
    pub session_history: Vec<Turn>,
}

#[derive(Serialize)]
pub struct QueuedResponse {
    pub status: &'static str,
    pub request_id: RequestId,
}

#[derive(Serialize)]
pub struct PendingResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub pending_jobs: usize,
    pub queue_capacity: usize,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
