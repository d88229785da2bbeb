//! Bounded job queue
//!
//! Producers never wait: a submission either lands in a free slot or is
//! rejected on the spot with [`EngineError::QueueFull`].

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::{EngineError, Result};

/// Unique identifier handed back to the producer at submission time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One earlier exchange of the current chat session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub user: String,
    pub model: String,
}

/// A queued chat inference job
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub request_id: RequestId,
    /// Directory of the model to answer with
    pub model_location: PathBuf,
    /// Persona the answers are framed as
    pub display_name: String,
    pub input_text: String,
    /// Acting identity; keys the model cache and the corpora
    pub identity: String,
    pub session_history: Vec<Turn>,
}

/// Producer side of the job queue
#[derive(Debug, Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<InferenceRequest>,
}

/// Consumer side of the job queue, owned by the worker
#[derive(Debug)]
pub struct JobReceiver {
    receiver: mpsc::Receiver<InferenceRequest>,
}

impl JobQueue {
    /// Create a queue holding at most `capacity` unconsumed jobs
    pub fn bounded(capacity: usize) -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, JobReceiver { receiver })
    }

    /// Enqueue a job without waiting
    pub fn submit(&self, request: InferenceRequest) -> Result<RequestId> {
        let request_id = request.request_id.clone();
        match self.sender.try_send(request) {
            Ok(()) => {
                tracing::debug!(request_id = %request_id, pending = self.pending(), "Job queued");
                Ok(request_id)
            }
            Err(TrySendError::Full(_)) => Err(EngineError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(EngineError::WorkerStopped),
        }
    }

    /// Number of jobs waiting to be consumed
    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }
}

impl JobReceiver {
    /// Block the current thread until a job arrives; `None` once every
    /// producer is gone
    pub fn blocking_next(&mut self) -> Option<InferenceRequest> {
        self.receiver.blocking_recv()
    }

    /// Wait for the next job
    pub async fn next(&mut self) -> Option<InferenceRequest> {
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> InferenceRequest {
        InferenceRequest {
            request_id: RequestId::new(),
            model_location: PathBuf::from("/models/a"),
            display_name: "Ann".to_string(),
            input_text: text.to_string(),
            identity: "7".to_string(),
            session_history: Vec::new(),
        }
    }

    #[test]
    fn test_eleventh_submission_is_rejected() {
        let (queue, _receiver) = JobQueue::bounded(10);
        for i in 0..10 {
            queue.submit(request(&format!("job {i}"))).unwrap();
        }
        assert_eq!(queue.pending(), 10);

        let err = queue.submit(request("one too many")).unwrap_err();
        assert!(matches!(err, EngineError::QueueFull));
        assert_eq!(queue.pending(), 10);
    }

    #[tokio::test]
    async fn test_consuming_frees_a_slot_in_fifo_order() {
        let (queue, mut receiver) = JobQueue::bounded(2);
        let first = queue.submit(request("first")).unwrap();
        queue.submit(request("second")).unwrap();
        assert!(queue.submit(request("third")).is_err());

        let job = receiver.next().await.unwrap();
        assert_eq!(job.request_id, first);
        assert_eq!(job.input_text, "first");

        queue.submit(request("third")).unwrap();
        assert_eq!(receiver.next().await.unwrap().input_text, "second");
        assert_eq!(receiver.next().await.unwrap().input_text, "third");
    }

    #[test]
    fn test_closed_queue_reports_stopped_worker() {
        let (queue, receiver) = JobQueue::bounded(1);
        drop(receiver);
        assert!(matches!(
            queue.submit(request("hi")),
            Err(EngineError::WorkerStopped)
        ));
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }
}
