//! Scripted collaborators for engine tests

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};

use super::chance::{Chance, Sleeper};
use super::queue::Turn;
use crate::config::GenerationConfig;
use crate::context::{CorpusStore, Example, Retriever};
use crate::error::EngineError;
use crate::loader::{CausalLm, DeviceMemory, FootprintMeter, LoadedModel, ModelStore};
use crate::rewrite::Rewriter;
use crate::tokenizer::TokenizerTrait;

/// One character per token, ids are code points
pub struct CharTokenizer;

impl TokenizerTrait for CharTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.chars().map(|c| c as u32).collect())
    }

    fn decode(&self, ids: &[u32], _skip_special_tokens: bool) -> Result<String> {
        Ok(ids.iter().filter_map(|&id| char::from_u32(id)).collect())
    }

    fn eos_token_id(&self) -> Option<u32> {
        None
    }

    fn bos_token_id(&self) -> Option<u32> {
        None
    }
}

/// What one generation attempt does
#[derive(Debug, Clone)]
pub enum Step {
    /// Produce these continuations
    Texts(Vec<&'static str>),
    OutOfMemory,
    Fail,
    /// Fail with an error no retry can fix
    Reject,
}

/// Model that replays a fixed script, one step per `generate` call
pub struct ScriptedLm {
    steps: Mutex<VecDeque<Step>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedLm {
    pub fn new(steps: Vec<Step>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                steps: Mutex::new(steps.into()),
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl CausalLm for ScriptedLm {
    fn generate(
        &self,
        prompt: &[u32],
        _params: &GenerationConfig,
        _num_sequences: usize,
    ) -> Result<Vec<Vec<u32>>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Texts(vec![""]));
        match step {
            Step::Texts(texts) => Ok(texts
                .into_iter()
                .map(|text| {
                    let mut ids = prompt.to_vec();
                    ids.extend(text.chars().map(|c| c as u32));
                    ids
                })
                .collect()),
            Step::OutOfMemory => Err(EngineError::GenerationOutOfMemory("CUDA out of memory".into())),
            Step::Fail => Err(EngineError::GenerationTransient("forward pass failed".into())),
            Step::Reject => Err(EngineError::invalid_request("prompt exceeds the context window")),
        }
    }
}

/// Wrap a scripted model into a resident model
pub fn scripted_model(steps: Vec<Step>) -> (Arc<LoadedModel>, Arc<AtomicUsize>) {
    let (lm, calls) = ScriptedLm::new(steps);
    (
        Arc::new(LoadedModel::new(Box::new(lm), Box::new(CharTokenizer))),
        calls,
    )
}

/// Store producing scripted models that each hold `footprint` bytes
pub struct FakeStore {
    meter: Arc<FootprintMeter>,
    footprint: u64,
    adapters: HashSet<PathBuf>,
    failing: HashSet<PathBuf>,
    steps: Vec<Step>,
    loads: AtomicUsize,
    adapter_flags: Mutex<Vec<bool>>,
}

impl FakeStore {
    pub fn new(meter: Arc<FootprintMeter>, footprint: u64) -> Self {
        Self {
            meter,
            footprint,
            adapters: HashSet::new(),
            failing: HashSet::new(),
            steps: Vec::new(),
            loads: AtomicUsize::new(0),
            adapter_flags: Mutex::new(Vec::new()),
        }
    }

    pub fn with_adapter_at(mut self, location: &str) -> Self {
        self.adapters.insert(PathBuf::from(location));
        self
    }

    pub fn failing_at(mut self, location: &str) -> Self {
        self.failing.insert(PathBuf::from(location));
        self
    }

    /// Script every model this store loads
    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn adapter_flags(&self) -> Vec<bool> {
        self.adapter_flags.lock().unwrap().clone()
    }
}

impl ModelStore for FakeStore {
    fn has_adapter(&self, location: &Path) -> bool {
        self.adapters.contains(location)
    }

    fn load(&self, location: &Path, attach_adapter: bool) -> Result<LoadedModel> {
        if self.failing.contains(location) {
            return Err(anyhow!("config.json not found"));
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.adapter_flags.lock().unwrap().push(attach_adapter);
        let (lm, _) = ScriptedLm::new(self.steps.clone());
        Ok(LoadedModel::new(Box::new(lm), Box::new(CharTokenizer))
            .with_footprint(self.meter.reserve(self.footprint)))
    }
}

/// Chance with fixed answers
pub struct FixedChance {
    pub two_candidates: bool,
    pub pick: usize,
    pub delay_fraction: f64,
}

impl Default for FixedChance {
    fn default() -> Self {
        Self {
            two_candidates: false,
            pick: 0,
            delay_fraction: 0.5,
        }
    }
}

impl Chance for FixedChance {
    fn two_candidates(&mut self) -> bool {
        self.two_candidates
    }

    fn pick(&mut self, len: usize) -> usize {
        self.pick.min(len - 1)
    }

    fn delay_in(&mut self, window: std::ops::Range<Duration>) -> Duration {
        window.start + (window.end - window.start).mul_f64(self.delay_fraction)
    }
}

/// Records requested pauses instead of sleeping
#[derive(Default)]
pub struct RecordingSleeper {
    pub pauses: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.pauses.lock().unwrap().push(duration);
    }
}

/// Device memory that counts cache flushes
#[derive(Default)]
pub struct FlushCounter {
    flushes: AtomicUsize,
}

impl FlushCounter {
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl DeviceMemory for FlushCounter {
    fn allocated(&self) -> u64 {
        0
    }

    fn total(&self) -> u64 {
        u64::MAX
    }

    fn empty_cache(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Corpus store holding in-memory example sets per identity
#[derive(Default)]
pub struct MemoryCorpus {
    pub corpora: Vec<(String, Vec<Example>)>,
}

impl CorpusStore for MemoryCorpus {
    fn list_corpora(&self, identity: &str) -> Result<Vec<PathBuf>> {
        Ok(self
            .corpora
            .iter()
            .filter(|(owner, _)| owner == identity)
            .enumerate()
            .map(|(i, _)| PathBuf::from(format!("{identity}/{i}.csv")))
            .collect())
    }

    fn read_examples(&self, corpus: &Path) -> Result<Vec<Example>> {
        let index: usize = corpus
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| anyhow!("bad corpus handle"))?;
        let owner = corpus
            .parent()
            .and_then(|p| p.to_str())
            .ok_or_else(|| anyhow!("bad corpus handle"))?;
        self.corpora
            .iter()
            .filter(|(o, _)| o == owner)
            .nth(index)
            .map(|(_, rows)| rows.clone())
            .ok_or_else(|| anyhow!("corpus missing"))
    }
}

/// Retriever returning the same snippet for everyone
pub struct FixedRetriever(pub &'static str);

impl Retriever for FixedRetriever {
    fn retrieve(&self, _identity: &str, _query: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

/// Rewriter that always fails
pub struct FailingRewriter;

impl Rewriter for FailingRewriter {
    fn rewrite(
        &self,
        _input: &str,
        _candidate: &str,
        _persona: &str,
        _context: &str,
        _history: &[Turn],
    ) -> Result<String> {
        Err(anyhow!("upstream returned 524"))
    }
}

/// Rewriter that tags candidates with the persona
pub struct TaggingRewriter;

impl Rewriter for TaggingRewriter {
    fn rewrite(
        &self,
        _input: &str,
        candidate: &str,
        persona: &str,
        _context: &str,
        _history: &[Turn],
    ) -> Result<String> {
        Ok(format!("{persona}: {candidate}"))
    }
}
