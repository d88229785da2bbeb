//! Llama-family models on candle
//!
//! Loads HuggingFace safetensors checkpoints (single or sharded), merges an
//! optional LoRA adapter into the base weights and samples continuations
//! with a fresh KV cache per sequence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig};

use super::adapter;
use super::detect::{self, detect_model_source};
use super::memory::FootprintMeter;
use super::{CausalLm, LoadedModel, ModelStore};
use crate::config::GenerationConfig;
use crate::error::EngineError;
use crate::tokenizer::{Tokenizer, TokenizerTrait};

/// Loads Llama checkpoints onto one device
pub struct LlamaStore {
    device: Device,
    dtype: DType,
    /// Base checkpoint for adapter-only model directories
    base_dir: Option<PathBuf>,
    meter: Arc<FootprintMeter>,
}

impl LlamaStore {
    pub fn new(device: Device, dtype: DType, meter: Arc<FootprintMeter>) -> Self {
        Self {
            device,
            dtype,
            base_dir: None,
            meter,
        }
    }

    /// Set the base checkpoint used when a model directory holds only an adapter
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    fn load_tokenizer(&self, location: &Path, config_path: &Path) -> Result<Tokenizer> {
        match Tokenizer::from_dir(location) {
            Ok(tokenizer) => Ok(tokenizer),
            Err(_) => {
                let fallback = config_path.parent().unwrap_or(location);
                Tokenizer::from_dir(fallback)
            }
        }
    }
}

impl ModelStore for LlamaStore {
    fn has_adapter(&self, location: &Path) -> bool {
        detect::has_adapter(location)
    }

    fn load(&self, location: &Path, attach_adapter: bool) -> Result<LoadedModel> {
        let start = std::time::Instant::now();
        let source = detect_model_source(location, self.base_dir.as_deref())?;

        let raw = std::fs::read(&source.config_path)
            .with_context(|| format!("reading {}", source.config_path.display()))?;
        let llama_config: LlamaConfig = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing {}", source.config_path.display()))?;
        let config = llama_config.into_config(false);

        let mut tensors: HashMap<String, Tensor> = HashMap::new();
        for file in &source.weight_files {
            let shard = candle_core::safetensors::load(file, &self.device)
                .with_context(|| format!("loading {}", file.display()))?;
            tensors.extend(shard);
        }

        if attach_adapter {
            if let Some(adapter_source) = &source.adapter {
                let merged = adapter::merge_adapter(&mut tensors, adapter_source, &self.device)?;
                tracing::info!(
                    location = %location.display(),
                    merged,
                    "Merged LoRA adapter into base weights"
                );
            }
        }

        let bytes: u64 = tensors
            .values()
            .map(|t| (t.elem_count() * self.dtype.size_in_bytes()) as u64)
            .sum();

        let vb = VarBuilder::from_tensors(tensors, self.dtype, &self.device);
        let model = Llama::load(vb, &config).context("building llama model")?;
        let tokenizer = self.load_tokenizer(location, &source.config_path)?;

        tracing::info!(
            location = %location.display(),
            size_gb = bytes as f64 / (1024.0 * 1024.0 * 1024.0),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model loaded"
        );

        let lm = LlamaLm {
            model,
            config,
            dtype: self.dtype,
            device: self.device.clone(),
            eos_token_id: tokenizer.eos_token_id(),
        };

        Ok(LoadedModel::new(Box::new(lm), Box::new(tokenizer)).with_footprint(self.meter.reserve(bytes)))
    }
}

/// A loaded Llama model ready for sampling
pub struct LlamaLm {
    model: Llama,
    config: Config,
    dtype: DType,
    device: Device,
    eos_token_id: Option<u32>,
}

impl LlamaLm {
    fn sample_one(
        &self,
        prompt: &[u32],
        params: &GenerationConfig,
        seed: u64,
    ) -> candle_core::Result<Vec<u32>> {
        let mut cache = Cache::new(true, self.dtype, &self.config, &self.device)?;
        let mut logits_processor = LogitsProcessor::from_sampling(seed, sampling(params));

        let budget = self
            .config
            .max_position_embeddings
            .saturating_sub(prompt.len())
            .min(params.max_new_tokens);

        let mut tokens = prompt.to_vec();
        let mut index_pos = 0;

        for step in 0..budget {
            let context = if step == 0 {
                &tokens[..]
            } else {
                &tokens[tokens.len() - 1..]
            };
            let input = Tensor::new(context, &self.device)?.unsqueeze(0)?;
            let logits = self.model.forward(&input, index_pos, &mut cache)?;
            let logits = logits.squeeze(0)?.to_dtype(DType::F32)?;
            index_pos += context.len();

            let next_token = logits_processor.sample(&logits)?;
            tokens.push(next_token);

            if Some(next_token) == self.eos_token_id {
                tracing::debug!(step, "Hit EOS token, stopping generation");
                break;
            }
        }

        Ok(tokens)
    }
}

impl CausalLm for LlamaLm {
    fn generate(
        &self,
        prompt: &[u32],
        params: &GenerationConfig,
        num_sequences: usize,
    ) -> Result<Vec<Vec<u32>>, EngineError> {
        if prompt.is_empty() {
            return Err(EngineError::GenerationTransient("empty prompt".into()));
        }

        (0..num_sequences)
            .map(|i| {
                let seed = params
                    .seed
                    .map(|s| s.wrapping_add(i as u64))
                    .unwrap_or_else(rand::random);
                self.sample_one(prompt, params, seed)
                    .map_err(generation_error)
            })
            .collect()
    }
}

fn sampling(params: &GenerationConfig) -> Sampling {
    if params.is_greedy() {
        Sampling::ArgMax
    } else {
        Sampling::TopKThenTopP {
            k: params.top_k,
            p: params.top_p as f64,
            temperature: params.temperature as f64,
        }
    }
}

/// Classify a candle error; allocator failures are retried after a cache flush
fn generation_error(err: candle_core::Error) -> EngineError {
    let message = err.to_string();
    if message.to_lowercase().contains("out of memory") {
        EngineError::GenerationOutOfMemory(message)
    } else {
        EngineError::GenerationTransient(message)
    }
}
