//! Core inference engine
//!
//! - Queue: bounded, non-blocking job submission
//! - Results: poll-once result store with a retention sweep
//! - Cache: per-identity resident models with usage-based eviction
//! - Pipeline: greeting fast path, prompt assembly, generation, cleanup, retries
//! - Worker: the single thread that runs jobs one at a time
//!
//! [`Engine`] is the handle producers and pollers share.

mod cache;
mod chance;
mod pipeline;
mod postprocess;
mod prompt;
mod queue;
mod results;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::ModelCache;
pub use chance::{Chance, RngChance, Sleeper, ThreadSleeper};
pub use pipeline::{is_greeting, InferencePipeline, PipelineOutput};
pub use postprocess::{clean_candidate, limit_stickers, STICKER};
pub use prompt::{PromptSources, ASSISTANT_MARKER};
pub use queue::{InferenceRequest, JobQueue, JobReceiver, RequestId, Turn};
pub use results::{Exchange, InferenceResult, PollOutcome, ResultStore};
pub use worker::{Worker, EXHAUSTED_MESSAGE};

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Shared handle to a running engine
#[derive(Debug, Clone)]
pub struct Engine {
    queue: JobQueue,
    results: Arc<ResultStore>,
}

impl Engine {
    /// Start the worker thread and the result sweeper.
    ///
    /// Must be called from within a tokio runtime, which drives the sweeper.
    pub fn start(config: &EngineConfig, cache: ModelCache, pipeline: InferencePipeline) -> Result<Self> {
        config.validate()?;
        let (engine, jobs) = Self::new(config);

        Worker::new(jobs, cache, pipeline, Arc::clone(&engine.results))
            .spawn()
            .map_err(|e| EngineError::Config(format!("failed to spawn worker thread: {e}")))?;
        Arc::clone(&engine.results).spawn_sweeper(config.sweep_interval());

        tracing::info!(
            queue_capacity = engine.capacity(),
            retention_secs = config.result_retention_secs,
            "Engine started"
        );
        Ok(engine)
    }

    /// Queue and result store without a worker; the caller drives `JobReceiver`
    pub fn new(config: &EngineConfig) -> (Self, JobReceiver) {
        let (queue, jobs) = JobQueue::bounded(config.queue_capacity);
        let results = Arc::new(ResultStore::new(config.retention()));
        (Self { queue, results }, jobs)
    }

    /// Queue a job; fails at once when the queue is full
    pub fn submit(&self, request: InferenceRequest) -> Result<RequestId> {
        self.queue.submit(request)
    }

    /// Collect the result for `request_id`, at most once
    pub fn poll(&self, request_id: &RequestId) -> PollOutcome {
        self.results.poll(request_id)
    }

    /// Jobs waiting for the worker
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }
}
