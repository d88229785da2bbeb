//! Poll-based result store
//!
//! The worker deposits exactly one result per request. A poll reads and
//! removes it in one step, so each result is delivered at most once.
//! Results nobody collects are dropped by a periodic sweep once they
//! outlive the retention window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::queue::RequestId;

/// One answered input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exchange {
    pub input: String,
    pub output: String,
}

/// Terminal outcome of one inference request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InferenceResult {
    Success {
        #[serde(rename = "result")]
        responses: Vec<Exchange>,
        msg: String,
        /// Unix timestamp of completion
        completed_at: i64,
    },
    Error {
        message: String,
    },
}

impl InferenceResult {
    /// Pair every output with the input it answers
    pub fn success(input: &str, outputs: Vec<String>) -> Self {
        let responses: Vec<Exchange> = outputs
            .into_iter()
            .map(|output| Exchange {
                input: input.to_string(),
                output,
            })
            .collect();
        Self::Success {
            msg: format!("received {} answer(s)", responses.len()),
            responses,
            completed_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Answer to a poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Not finished yet, already collected, expired, or never submitted
    Pending,
    Ready(InferenceResult),
}

#[derive(Debug)]
struct StoredResult {
    result: InferenceResult,
    created_at: Instant,
}

/// Shared map from request id to finished result
#[derive(Debug)]
pub struct ResultStore {
    entries: Mutex<HashMap<RequestId, StoredResult>>,
    retention: Duration,
}

impl ResultStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            retention,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, StoredResult>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deposit the result for `request_id`, replacing any earlier one
    pub fn insert(&self, request_id: RequestId, result: InferenceResult) {
        self.insert_at(request_id, result, Instant::now());
    }

    pub(crate) fn insert_at(&self, request_id: RequestId, result: InferenceResult, created_at: Instant) {
        self.lock().insert(request_id, StoredResult { result, created_at });
    }

    /// Read and remove the result for `request_id`
    pub fn poll(&self, request_id: &RequestId) -> PollOutcome {
        match self.lock().remove(request_id) {
            Some(stored) => PollOutcome::Ready(stored.result),
            None => PollOutcome::Pending,
        }
    }

    /// Drop every result older than the retention window, returning how many
    pub fn sweep(&self, now: Instant) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, stored| now.saturating_duration_since(stored.created_at) <= self.retention);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sweep every `interval` on the current tokio runtime
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; nothing can be stale yet.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = self.sweep(Instant::now());
                if removed > 0 {
                    tracing::info!(removed, remaining = self.len(), "Swept expired results");
                }
            }
        })
    }
}
