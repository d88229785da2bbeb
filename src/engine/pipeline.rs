//! Inference pipeline
//!
//! One run answers one chat input:
//! 1. greetings are echoed back after a short, human-looking pause
//! 2. otherwise the identity's model is resolved through the cache and a
//!    prompt is assembled from its corpora and retrieved knowledge
//! 3. up to `max_retries` attempts sample one or two candidates, clean
//!    them, and pass them through the rewriter
//!
//! An attempt succeeds as soon as any candidate survives cleanup.

use std::sync::Arc;

use crate::config::{GenerationConfig, PipelineConfig};
use crate::context::{CorpusStore, NoRetrieval, Retriever};
use crate::error::{EngineError, Result};
use crate::loader::{DeviceMemory, LoadedModel};
use crate::rewrite::{Passthrough, Rewriter};
use crate::tokenizer::truncate_front;

use super::cache::ModelCache;
use super::chance::{Chance, RngChance, Sleeper, ThreadSleeper};
use super::postprocess::clean_candidate;
use super::prompt::PromptSources;
use super::queue::InferenceRequest;

/// Inputs answered by echoing them back
const GREETINGS: &[&str] = &[
    "晚上好", "明天見", "安安", "午安", "晚安", "早安", "早阿", "早", "你好", "哈囉", "嗨", "掰掰", "拜拜",
    "掰", "拜", "掰囉", "拜囉", "掰掰囉", "拜拜囉", "再見", "hello", "hi", "hey", "good morning",
    "good afternoon", "good evening",
];

/// Whether `input` is one of the fixed greetings
pub fn is_greeting(input: &str) -> bool {
    let normalized = input.trim().to_lowercase();
    GREETINGS.iter().any(|greeting| *greeting == normalized)
}

/// Answers of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    /// Non-empty replies, in candidate order
    pub responses: Vec<String>,
    /// Generation attempts used; zero on the greeting path
    pub attempts: u32,
}

/// The per-job inference procedure, owned by the worker
pub struct InferencePipeline {
    generation: GenerationConfig,
    config: PipelineConfig,
    corpora: Arc<dyn CorpusStore>,
    retriever: Arc<dyn Retriever>,
    rewriter: Arc<dyn Rewriter>,
    chance: Box<dyn Chance>,
    sleeper: Arc<dyn Sleeper>,
    memory: Arc<dyn DeviceMemory>,
}

impl InferencePipeline {
    /// Pipeline without retrieval or rewriting, using real randomness and sleeps
    pub fn new(
        generation: GenerationConfig,
        config: PipelineConfig,
        corpora: Arc<dyn CorpusStore>,
        memory: Arc<dyn DeviceMemory>,
    ) -> Self {
        Self {
            generation,
            config,
            corpora,
            retriever: Arc::new(NoRetrieval),
            rewriter: Arc::new(Passthrough),
            chance: Box::new(RngChance::from_entropy()),
            sleeper: Arc::new(ThreadSleeper),
            memory,
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = retriever;
        self
    }

    pub fn with_rewriter(mut self, rewriter: Arc<dyn Rewriter>) -> Self {
        self.rewriter = rewriter;
        self
    }

    pub fn with_chance(mut self, chance: Box<dyn Chance>) -> Self {
        self.chance = chance;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Answer one request
    pub fn run(&mut self, cache: &mut ModelCache, request: &InferenceRequest) -> Result<PipelineOutput> {
        if is_greeting(&request.input_text) {
            let delay = self.chance.delay_in(self.config.greeting_delay());
            tracing::debug!(request_id = %request.request_id, delay_ms = delay.as_millis() as u64, "Greeting");
            self.sleeper.sleep(delay);
            return Ok(PipelineOutput {
                responses: vec![request.input_text.clone()],
                attempts: 0,
            });
        }

        let loaded = cache.resolve(&request.model_location, &request.identity)?;

        let sources = PromptSources {
            corpora: self.corpora.as_ref(),
            retriever: self.retriever.as_ref(),
            sample_rows: self.config.corpus_sample_rows,
        };
        let prompt = sources.assemble(self.chance.as_mut(), &request.identity, &request.input_text);

        let ids = loaded
            .tokenizer
            .encode(&prompt)
            .map_err(|e| EngineError::GenerationTransient(format!("tokenizing prompt: {e}")))?;
        let ids = truncate_front(ids, self.generation.max_prompt_tokens, loaded.tokenizer.bos_token_id());

        let max_attempts = self.config.max_retries.max(1);
        for attempt in 1..=max_attempts {
            let num_sequences = if self.chance.two_candidates() { 2 } else { 1 };
            let pause = match loaded.model.generate(&ids, &self.generation, num_sequences) {
                Ok(sequences) => {
                    let responses = self.finish(&loaded, &sequences, request, &prompt);
                    if !responses.is_empty() {
                        tracing::info!(
                            request_id = %request.request_id,
                            attempt,
                            candidates = responses.len(),
                            "Generated answer"
                        );
                        return Ok(PipelineOutput {
                            responses,
                            attempts: attempt,
                        });
                    }
                    tracing::warn!(request_id = %request.request_id, attempt, "Empty response, retrying");
                    self.config.retry_delay()
                }
                Err(EngineError::GenerationOutOfMemory(reason)) => {
                    tracing::error!(request_id = %request.request_id, attempt, %reason, "Out of memory, clearing device cache");
                    self.memory.empty_cache();
                    self.config.oom_backoff()
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(request_id = %request.request_id, attempt, error = %e, "Inference attempt failed");
                    self.config.retry_delay()
                }
                Err(e) => {
                    tracing::error!(request_id = %request.request_id, attempt, error = %e, "Inference aborted");
                    return Err(e);
                }
            };

            if attempt < max_attempts {
                self.sleeper.sleep(pause);
            }
        }

        tracing::error!(request_id = %request.request_id, attempts = max_attempts, "All inference attempts failed or returned empty responses");
        Err(EngineError::GenerationExhausted {
            attempts: max_attempts,
        })
    }

    /// Decode, clean and rewrite every candidate, keeping the non-empty ones
    fn finish(
        &self,
        loaded: &LoadedModel,
        sequences: &[Vec<u32>],
        request: &InferenceRequest,
        context: &str,
    ) -> Vec<String> {
        let mut responses = Vec::with_capacity(sequences.len());
        for sequence in sequences {
            let decoded = match loaded.tokenizer.decode(sequence, true) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(request_id = %request.request_id, error = %e, "Failed to decode candidate");
                    continue;
                }
            };

            let candidate = clean_candidate(&decoded, &request.input_text, self.config.max_stickers);
            if candidate.is_empty() {
                continue;
            }

            let reply = match self.rewriter.rewrite(
                &request.input_text,
                &candidate,
                &request.display_name,
                context,
                &request.session_history,
            ) {
                Ok(rewritten) if !rewritten.trim().is_empty() => rewritten,
                Ok(_) => candidate,
                Err(e) => {
                    tracing::warn!(request_id = %request.request_id, error = %e, "Rewrite failed, keeping candidate");
                    candidate
                }
            };
            responses.push(reply);
        }
        responses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use crate::config::CacheConfig;
    use crate::engine::queue::RequestId;
    use crate::engine::testing::{
        FailingRewriter, FakeStore, FixedChance, FlushCounter, MemoryCorpus, RecordingSleeper, Step,
        TaggingRewriter,
    };
    use crate::loader::FootprintMeter;

    struct Harness {
        cache: ModelCache,
        store: Arc<FakeStore>,
        sleeper: Arc<RecordingSleeper>,
        memory: Arc<FlushCounter>,
    }

    impl Harness {
        fn new(steps: Vec<Step>) -> Self {
            let meter = Arc::new(FootprintMeter::new(1 << 30));
            let store = Arc::new(FakeStore::new(Arc::clone(&meter), 100).with_steps(steps));
            let cache = ModelCache::new(store.clone(), meter, &CacheConfig::default());
            Self {
                cache,
                store,
                sleeper: Arc::new(RecordingSleeper::default()),
                memory: Arc::new(FlushCounter::default()),
            }
        }

        fn pipeline(&self, chance: FixedChance) -> InferencePipeline {
            InferencePipeline::new(
                GenerationConfig::default(),
                PipelineConfig::default(),
                Arc::new(MemoryCorpus::default()),
                self.memory.clone(),
            )
            .with_chance(Box::new(chance))
            .with_sleeper(self.sleeper.clone())
        }
    }

    fn request(input: &str) -> InferenceRequest {
        InferenceRequest {
            request_id: RequestId::new(),
            model_location: PathBuf::from("/models/ann"),
            display_name: "Ann".into(),
            input_text: input.into(),
            identity: "7".into(),
            session_history: Vec::new(),
        }
    }

    #[test]
    fn test_greeting_skips_the_model() {
        let mut harness = Harness::new(vec![]);
        let mut pipeline = harness.pipeline(FixedChance::default());

        let output = pipeline.run(&mut harness.cache, &request("哈囉")).unwrap();
        assert_eq!(output.responses, vec!["哈囉".to_string()]);
        assert_eq!(output.attempts, 0);
        assert_eq!(harness.store.loads(), 0);

        let pauses = harness.sleeper.pauses();
        assert_eq!(pauses.len(), 1);
        assert!(pauses[0] >= Duration::from_secs(3) && pauses[0] < Duration::from_secs(7));
    }

    #[test]
    fn test_greeting_match_ignores_case_and_whitespace() {
        assert!(is_greeting("  Good Morning "));
        assert!(is_greeting("HI"));
        assert!(!is_greeting("hi there"));
        assert!(!is_greeting("早安啊"));
    }

    #[test]
    fn test_third_attempt_succeeds_after_two_empty_ones() {
        let mut harness = Harness::new(vec![
            Step::Texts(vec![""]),
            Step::Texts(vec!["User: null"]),
            Step::Texts(vec!["好啊"]),
        ]);
        let mut pipeline = harness.pipeline(FixedChance::default());

        let output = pipeline.run(&mut harness.cache, &request("要出去嗎")).unwrap();
        assert_eq!(output.attempts, 3);
        assert_eq!(output.responses, vec!["好啊".to_string()]);
        assert_eq!(harness.sleeper.pauses(), vec![Duration::from_secs(1); 2]);
    }

    #[test]
    fn test_exhaustion_is_reported() {
        let mut harness = Harness::new(vec![Step::Fail, Step::Texts(vec![""]), Step::Texts(vec![""])]);
        let mut pipeline = harness.pipeline(FixedChance::default());

        let err = pipeline.run(&mut harness.cache, &request("要出去嗎")).unwrap_err();
        assert!(matches!(err, EngineError::GenerationExhausted { attempts: 3 }));
    }

    #[test]
    fn test_out_of_memory_clears_cache_and_backs_off() {
        let mut harness = Harness::new(vec![Step::OutOfMemory, Step::Texts(vec!["好"])]);
        let mut pipeline = harness.pipeline(FixedChance::default());

        let output = pipeline.run(&mut harness.cache, &request("要出去嗎")).unwrap();
        assert_eq!(output.attempts, 2);
        assert_eq!(harness.memory.flushes(), 1);
        assert_eq!(harness.sleeper.pauses(), vec![Duration::from_secs(2)]);
    }

    #[test]
    fn test_non_retryable_generation_error_aborts() {
        let mut harness = Harness::new(vec![Step::Reject, Step::Texts(vec!["好啊"])]);
        let mut pipeline = harness.pipeline(FixedChance::default());

        let err = pipeline.run(&mut harness.cache, &request("要出去嗎")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
        assert!(harness.sleeper.pauses().is_empty());
    }

    #[test]
    fn test_rewrite_failure_keeps_candidate() {
        let mut harness = Harness::new(vec![Step::Texts(vec!["好啊"])]);
        let mut pipeline = harness
            .pipeline(FixedChance::default())
            .with_rewriter(Arc::new(FailingRewriter));

        let output = pipeline.run(&mut harness.cache, &request("要出去嗎")).unwrap();
        assert_eq!(output.responses, vec!["好啊".to_string()]);
    }

    #[test]
    fn test_two_candidates_are_rewritten_as_persona() {
        let mut harness = Harness::new(vec![Step::Texts(vec!["好啊", "走吧"])]);
        let chance = FixedChance {
            two_candidates: true,
            ..Default::default()
        };
        let mut pipeline = harness.pipeline(chance).with_rewriter(Arc::new(TaggingRewriter));

        let output = pipeline.run(&mut harness.cache, &request("要出去嗎")).unwrap();
        assert_eq!(output.responses, vec!["Ann: 好啊".to_string(), "Ann: 走吧".to_string()]);
    }

    #[test]
    fn test_model_load_failure_is_not_retried() {
        let meter = Arc::new(FootprintMeter::new(1 << 30));
        let store = Arc::new(FakeStore::new(Arc::clone(&meter), 100).failing_at("/models/ann"));
        let mut cache = ModelCache::new(store, meter, &CacheConfig::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut pipeline = InferencePipeline::new(
            GenerationConfig::default(),
            PipelineConfig::default(),
            Arc::new(MemoryCorpus::default()),
            Arc::new(FlushCounter::default()),
        )
        .with_sleeper(sleeper.clone());

        let err = pipeline.run(&mut cache, &request("要出去嗎")).unwrap_err();
        assert!(matches!(err, EngineError::ModelLoad { .. }));
        assert!(sleeper.pauses().is_empty());
    }
}
