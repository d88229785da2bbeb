//! Decoding settings for candidate replies

use serde::{Deserialize, Serialize};

/// Decoding parameters shared by every generation attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum number of new tokens per candidate
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,

    /// Prompt length bound; longer prompts are truncated
    #[serde(default = "default_max_prompt_tokens")]
    pub max_prompt_tokens: usize,

    /// Softmax temperature; 0 falls back to argmax
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus mass kept after top-k filtering
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Candidate tokens kept per step
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Sample instead of greedy argmax decoding
    #[serde(default = "default_true")]
    pub do_sample: bool,

    /// Base seed; the n-th candidate uses `seed + n`. Unset draws a fresh seed
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_max_new_tokens() -> usize {
    50
}

fn default_max_prompt_tokens() -> usize {
    256
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.85
}

fn default_top_k() -> usize {
    30
}

fn default_true() -> bool {
    true
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: default_max_new_tokens(),
            max_prompt_tokens: default_max_prompt_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            do_sample: true,
            seed: None,
        }
    }
}

impl GenerationConfig {
    /// Deterministic argmax decoding
    pub fn greedy() -> Self {
        Self {
            do_sample: false,
            ..Default::default()
        }
    }

    pub fn is_greedy(&self) -> bool {
        !self.do_sample || self.temperature <= 0.0
    }
}
