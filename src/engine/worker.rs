//! Serial worker loop
//!
//! One dedicated thread drains the job queue, runs each job through the
//! pipeline and stores exactly one result for it. Nothing that happens
//! inside a job, panics included, stops the loop.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::EngineError;

use super::cache::ModelCache;
use super::pipeline::InferencePipeline;
use super::queue::{InferenceRequest, JobReceiver};
use super::results::{InferenceResult, ResultStore};

/// Message stored when every generation attempt came back empty or failed
pub const EXHAUSTED_MESSAGE: &str = "Inference failed";

/// Owns the model cache and the pipeline; the only consumer of the queue
pub struct Worker {
    jobs: JobReceiver,
    cache: ModelCache,
    pipeline: InferencePipeline,
    results: Arc<ResultStore>,
}

impl Worker {
    pub fn new(
        jobs: JobReceiver,
        cache: ModelCache,
        pipeline: InferencePipeline,
        results: Arc<ResultStore>,
    ) -> Self {
        Self {
            jobs,
            cache,
            pipeline,
            results,
        }
    }

    /// Run the loop on a named thread until every producer is gone
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("mimic-worker".to_string())
            .spawn(move || self.run())
    }

    /// Process jobs in arrival order until the queue closes
    pub fn run(mut self) {
        tracing::info!("Inference worker started");
        while let Some(job) = self.jobs.blocking_next() {
            let request_id = job.request_id.clone();
            let result = self.process(&job);
            self.results.insert(request_id, result);
        }
        tracing::info!("Job queue closed, inference worker exiting");
    }

    /// Turn one job into its result
    pub fn process(&mut self, job: &InferenceRequest) -> InferenceResult {
        tracing::info!(request_id = %job.request_id, identity = %job.identity, "Processing job");

        let cache = &mut self.cache;
        let pipeline = &mut self.pipeline;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| pipeline.run(cache, job)));

        match outcome {
            Ok(Ok(output)) => InferenceResult::success(&job.input_text, output.responses),
            Ok(Err(EngineError::GenerationExhausted { attempts })) => {
                tracing::error!(request_id = %job.request_id, attempts, "Inference failed");
                InferenceResult::error(EXHAUSTED_MESSAGE)
            }
            Ok(Err(e)) => {
                tracing::error!(request_id = %job.request_id, error = %e, "Job failed");
                InferenceResult::error(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(request_id = %job.request_id, panic = %message, "Job panicked");
                InferenceResult::error(format!("internal error: {message}"))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
