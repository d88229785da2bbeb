//! Model storage collaborator
//!
//! The engine sees models only through three seams:
//! - [`ModelStore`]: loads a (model, tokenizer) pair from a location and
//!   reports whether adapter weights live there
//! - [`CausalLm`]: samples continuations from token ids
//! - [`DeviceMemory`]: reports device allocation for cache eviction
//!
//! The shipped backend loads Llama-family safetensors checkpoints with
//! candle and merges LoRA adapters into the base weights.

mod adapter;
mod detect;
mod llama;
mod memory;

pub use adapter::{merge_adapter, merge_lora_tensors, LoraConfig};
pub use detect::{detect_model_source, has_adapter, AdapterSource, ModelSource, ADAPTER_CONFIG};
pub use llama::{LlamaLm, LlamaStore};
pub use memory::{device_total_memory, DeviceMemory, FootprintGuard, FootprintMeter};

use std::path::Path;

use anyhow::Result;

use crate::config::GenerationConfig;
use crate::error::EngineError;
use crate::tokenizer::BoxedTokenizer;

/// A model that samples continuations
pub trait CausalLm: Send + Sync {
    /// Sample `num_sequences` continuations of `prompt`.
    ///
    /// Each returned sequence starts with the prompt tokens, followed by
    /// the generated ones.
    fn generate(
        &self,
        prompt: &[u32],
        params: &GenerationConfig,
        num_sequences: usize,
    ) -> Result<Vec<Vec<u32>>, EngineError>;
}

/// Loads models from storage
pub trait ModelStore: Send + Sync {
    /// Whether adapter weights are present at `location`
    fn has_adapter(&self, location: &Path) -> bool;

    /// Load the model at `location` onto the compute device in inference
    /// mode, attaching adapter weights when `attach_adapter` is set
    fn load(&self, location: &Path, attach_adapter: bool) -> Result<LoadedModel>;
}

/// A resident (model, tokenizer) pair
pub struct LoadedModel {
    pub model: Box<dyn CausalLm>,
    pub tokenizer: BoxedTokenizer,
    footprint: Option<FootprintGuard>,
}

impl LoadedModel {
    pub fn new(model: Box<dyn CausalLm>, tokenizer: BoxedTokenizer) -> Self {
        Self {
            model,
            tokenizer,
            footprint: None,
        }
    }

    /// Attach the device memory this model holds until dropped
    pub fn with_footprint(mut self, footprint: FootprintGuard) -> Self {
        self.footprint = Some(footprint);
        self
    }

    /// Bytes of device memory held by the weights
    pub fn footprint_bytes(&self) -> u64 {
        self.footprint.as_ref().map(|f| f.bytes()).unwrap_or(0)
    }
}
