//! Mimic - chat inference with per-user fine-tuned models
//!
//! Every user owns a model (a base checkpoint, usually with a LoRA adapter)
//! and a set of chat corpora. Mimic answers messages in that user's voice.
//!
//! # Architecture
//!
//! - **engine**: bounded job queue, a single serial worker, a poll-once
//!   result store and a per-identity model cache
//! - **loader**: candle backend for Llama-family safetensors checkpoints
//! - **context**, **rewrite**, **registry**: prompt material, restyling and
//!   model lookup
//! - **server**, **cli**: HTTP and command line front ends
//!
//! # Example
//!
//! ```bash
//! # Start server
//! mimic serve --config mimic.yaml --port 8080
//!
//! # Answer one message
//! mimic chat --model-dir ./saved_models/ann-v2 --identity 7 "要出去嗎"
//! ```

pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod loader;
pub mod registry;
pub mod rewrite;
pub mod server;
pub mod tokenizer;

// Re-export key types
pub use config::{GenerationConfig, MimicConfig, ServerConfig};
pub use engine::{Engine, InferenceRequest, InferenceResult, PollOutcome, RequestId};
pub use error::{EngineError, Result};
