//! Configuration system for mimic
//!
//! A single YAML (or JSON) document configures the HTTP server, the job
//! queue, the model cache, decoding, the pipeline and the collaborators.
//! Every field has a default, so an empty document is a valid config.

mod engine;
mod generation;
mod inference;
mod retrieval;
mod rewrite;
mod server;

pub use engine::{CacheConfig, EngineConfig, PipelineConfig};
pub use generation::GenerationConfig;
pub use inference::{DeviceConfig, InferenceConfig};
pub use retrieval::RetrievalConfig;
pub use rewrite::RewriteConfig;
pub use server::ServerConfig;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use candle_core::DType;
use serde::{Deserialize, Serialize};

/// Parse a dtype string into a candle `DType`.
///
/// Accepts short and long forms: "f32"/"float32", "f16"/"float16", "bf16"/"bfloat16".
pub fn parse_dtype(s: &str) -> Result<DType> {
    match s {
        "f32" | "float32" => Ok(DType::F32),
        "f16" | "float16" => Ok(DType::F16),
        "bf16" | "bfloat16" => Ok(DType::BF16),
        other => Err(anyhow!("unknown dtype: '{}'", other)),
    }
}

/// On-disk locations of the external collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// YAML file listing trained models and share grants
    #[serde(default = "default_registry")]
    pub model_registry: PathBuf,

    /// Directory holding `<identity>/*.csv` training corpora
    #[serde(default = "default_corpus_dir")]
    pub corpus_dir: PathBuf,
}

fn default_registry() -> PathBuf {
    PathBuf::from("./models.yaml")
}

fn default_corpus_dir() -> PathBuf {
    PathBuf::from("./training_files")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            model_registry: default_registry(),
            corpus_dir: default_corpus_dir(),
        }
    }
}

fn read_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read config {}", path.display()))
}

/// Top-level mimic configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MimicConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub inference: InferenceConfig,

    /// Remote restyling of candidates; disabled when absent
    #[serde(default)]
    pub rewrite: Option<RewriteConfig>,

    /// Knowledge retrieval for prompts; disabled when absent
    #[serde(default)]
    pub retrieval: Option<RetrievalConfig>,

    #[serde(default)]
    pub paths: PathsConfig,
}

impl MimicConfig {
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = read_config(path)?;
        serde_yaml::from_str(&content).with_context(|| format!("invalid YAML config {}", path.display()))
    }

    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = read_config(path)?;
        serde_json::from_str(&content).with_context(|| format!("invalid JSON config {}", path.display()))
    }

    /// Load from a file, picking the format from its extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(path)?,
            _ => Self::from_yaml(path)?,
        };
        config.engine.validate()?;
        Ok(config)
    }

    /// Get the weight dtype
    pub fn dtype(&self) -> Result<DType> {
        parse_dtype(&self.inference.dtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mimic_config_yaml() {
        let yaml = r#"
server:
  port: 9000
  host: 127.0.0.1

engine:
  queue_capacity: 4

cache:
  max_entries: 2
  memory_threshold: 0.5

generation:
  max_new_tokens: 64

inference:
  device: cuda:1
  dtype: bf16
  device_memory_bytes: 8000

rewrite:
  model: gpt-4o-mini

retrieval:
  chroma_url: http://chroma:8000
  n_results: 5

paths:
  corpus_dir: /data/corpora
"#;
        let config: MimicConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.addr(), "127.0.0.1:9000");
        assert_eq!(config.engine.queue_capacity, 4);
        assert_eq!(config.engine.result_retention_secs, 3600);
        assert_eq!(config.cache.threshold_bytes(8000), 4000);
        assert_eq!(config.generation.max_new_tokens, 64);
        assert_eq!(config.generation.top_k, 30);
        assert!(config.inference.device.is_cuda());
        assert_eq!(config.inference.device.device_id(), 1);
        assert_eq!(config.dtype().unwrap(), DType::BF16);
        let rewrite = config.rewrite.unwrap();
        assert_eq!(rewrite.model, "gpt-4o-mini");
        assert_eq!(rewrite.api_key_env, "OPENAI_API_KEY");
        let retrieval = config.retrieval.unwrap();
        assert_eq!(retrieval.n_results, 5);
        assert_eq!(retrieval.collection_name("7"), "collection_7");
        assert_eq!(config.paths.corpus_dir, PathBuf::from("/data/corpora"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: MimicConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.engine.queue_capacity, 10);
        assert_eq!(config.cache.max_entries, 3);
        assert_eq!(config.pipeline.max_retries, 3);
        assert!((config.generation.top_p - 0.85).abs() < f32::EPSILON);
        assert!(config.rewrite.is_none());
        assert!(config.retrieval.is_none());
        assert!(config.inference.device_memory_bytes.is_none());
        assert!(!config.inference.device.is_cuda());
    }

    #[test]
    fn test_greeting_delay_window() {
        let pipeline = PipelineConfig::default();
        let window = pipeline.greeting_delay();
        assert_eq!(window.start.as_secs(), 3);
        assert_eq!(window.end.as_secs(), 7);
    }

    #[test]
    fn test_parse_dtype() {
        assert_eq!(parse_dtype("f32").unwrap(), DType::F32);
        assert_eq!(parse_dtype("float16").unwrap(), DType::F16);
        assert_eq!(parse_dtype("bfloat16").unwrap(), DType::BF16);
    }

    #[test]
    fn test_load_picks_format_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("mimic.json");
        std::fs::write(&json, r#"{"engine": {"queue_capacity": 2}}"#).unwrap();
        assert_eq!(MimicConfig::load(&json).unwrap().engine.queue_capacity, 2);

        let yaml = dir.path().join("mimic.yaml");
        std::fs::write(&yaml, "cache:\n  max_entries: 1\n").unwrap();
        assert_eq!(MimicConfig::load(&yaml).unwrap().cache.max_entries, 1);

        assert!(MimicConfig::load(dir.path().join("missing.yaml")).is_err());

        let stalled = dir.path().join("stalled.yaml");
        std::fs::write(&stalled, "engine:\n  sweep_interval_secs: 0\n").unwrap();
        assert!(MimicConfig::load(&stalled).is_err());
    }

    #[test]
    fn test_parse_dtype_unknown() {
        assert!(parse_dtype("int8").is_err());
        assert!(parse_dtype("").is_err());
        assert!(parse_dtype("F32").is_err());
    }
}
