//! LoRA adapter merging
//!
//! Adapter weights are folded into the base tensors before the model is
//! built, so inference runs at base-model speed: `W' = W + scale * B·A`.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor};
use serde::Deserialize;

use super::detect::AdapterSource;

const LORA_A_SUFFIX: &str = ".lora_A.weight";
const LORA_B_SUFFIX: &str = ".lora_B.weight";
const PEFT_PREFIX: &str = "base_model.model.";

/// The subset of `adapter_config.json` needed for merging
#[derive(Debug, Clone, Deserialize)]
pub struct LoraConfig {
    /// Adapter rank
    pub r: usize,
    /// Scaling numerator
    pub lora_alpha: f64,
    /// Rank-stabilised scaling (alpha / sqrt(r))
    #[serde(default)]
    pub use_rslora: bool,
}

impl LoraConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        if config.r == 0 {
            return Err(anyhow!("adapter rank must be positive"));
        }
        Ok(config)
    }

    pub fn scale(&self) -> f64 {
        if self.use_rslora {
            self.lora_alpha / (self.r as f64).sqrt()
        } else {
            self.lora_alpha / self.r as f64
        }
    }
}

/// Load an adapter from disk and merge it into `base`
///
/// Returns the number of merged weight matrices.
pub fn merge_adapter(
    base: &mut HashMap<String, Tensor>,
    source: &AdapterSource,
    device: &Device,
) -> Result<usize> {
    let config = LoraConfig::from_file(&source.config_path)?;
    let adapter = candle_core::safetensors::load(&source.weights_path, device)
        .with_context(|| format!("loading {}", source.weights_path.display()))?;
    merge_lora_tensors(base, &adapter, config.scale())
}

/// Merge every `lora_A`/`lora_B` pair in `adapter` into the matching base weight
pub fn merge_lora_tensors(
    base: &mut HashMap<String, Tensor>,
    adapter: &HashMap<String, Tensor>,
    scale: f64,
) -> Result<usize> {
    let mut merged = 0;

    for (name, lora_a) in adapter {
        let Some(prefix) = name.strip_suffix(LORA_A_SUFFIX) else {
            continue;
        };
        let lora_b = adapter
            .get(&format!("{prefix}{LORA_B_SUFFIX}"))
            .ok_or_else(|| anyhow!("adapter is missing lora_B for {}", prefix))?;

        let target = base_weight_name(prefix);
        let weight = base
            .get(&target)
            .cloned()
            .ok_or_else(|| anyhow!("adapter targets unknown weight {}", target))?;

        let delta = lora_b
            .to_dtype(DType::F32)?
            .matmul(&lora_a.to_dtype(DType::F32)?)?
            .affine(scale, 0.0)?;
        let updated = weight
            .to_dtype(DType::F32)?
            .add(&delta)?
            .to_dtype(weight.dtype())?;

        base.insert(target, updated);
        merged += 1;
    }

    Ok(merged)
}

/// Map `base_model.model.model.layers.0.self_attn.q_proj` to the base tensor name
fn base_weight_name(prefix: &str) -> String {
    let stripped = prefix.strip_prefix(PEFT_PREFIX).unwrap_or(prefix);
    format!("{stripped}.weight")
}
