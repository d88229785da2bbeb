//! Error types for the inference engine

use thiserror::Error;

/// Errors raised by the engine and its collaborators
#[derive(Debug, Error)]
pub enum EngineError {
    /// The job queue already holds its full capacity of unconsumed jobs
    #[error("the server is busy, please try again later")]
    QueueFull,

    /// The worker has shut down and no longer consumes jobs
    #[error("inference worker is not running")]
    WorkerStopped,

    /// Loading a model on a cache miss failed
    #[error("failed to load model from {location}: {reason}")]
    ModelLoad { location: String, reason: String },

    /// The device ran out of memory during generation
    #[error("device out of memory during generation: {0}")]
    GenerationOutOfMemory(String),

    /// Any other generation-time failure
    #[error("generation failed: {0}")]
    GenerationTransient(String),

    /// Every attempt produced only empty candidates or failed
    #[error("inference failed after {attempts} attempts")]
    GenerationExhausted { attempts: u32 },

    /// No model is registered for the requested name and identity
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The submitted request is malformed
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Create a model load error for the given location
    pub fn model_load(location: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Self::ModelLoad {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid request error with the given message
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Whether the error is transient and worth another generation attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GenerationOutOfMemory(_) | Self::GenerationTransient(_)
        )
    }
}

/// Result alias for engine operations
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
