//! CLI commands
//!
//! `serve` runs the HTTP front end; `chat` pushes one message through the
//! same engine and prints the result.

mod chat;
mod serve;

pub use chat::chat;
pub use serve::serve;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::MimicConfig;
use crate::context::{ChromaRetriever, CsvCorpusStore};
use crate::engine::{Engine, InferencePipeline, ModelCache};
use crate::loader::{device_total_memory, FootprintMeter, LlamaStore};
use crate::rewrite::OpenAiRewriter;

/// Mimic - chat with models fine-tuned on your own conversations
#[derive(Parser)]
#[command(name = "mimic")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat inference server
    Serve {
        /// Configuration file (YAML or JSON)
        #[arg(long, short, env = "MIMIC_CONFIG")]
        config: Option<PathBuf>,

        /// Port to listen on, overriding the config
        #[arg(long)]
        port: Option<u16>,

        /// Host to bind to, overriding the config
        #[arg(long)]
        host: Option<String>,
    },

    /// Answer a single message and print the result
    Chat {
        /// Configuration file (YAML or JSON)
        #[arg(long, short, env = "MIMIC_CONFIG")]
        config: Option<PathBuf>,

        /// Model directory (base checkpoint, optionally with an adapter)
        #[arg(long, short)]
        model_dir: PathBuf,

        /// Identity whose corpora seed the prompt
        #[arg(long, default_value = "local")]
        identity: String,

        /// Persona the answer is framed as
        #[arg(long, default_value = "me")]
        persona: String,

        /// Message to answer
        input: String,
    },
}

/// Load the config file, or defaults when none is given
pub fn load_config(path: Option<&Path>) -> Result<MimicConfig> {
    match path {
        Some(path) => {
            tracing::info!("Loading config from {}", path.display());
            MimicConfig::load(path)
        }
        None => Ok(MimicConfig::default()),
    }
}

/// Wire the candle backend, corpora, retriever and rewriter into a running engine
pub(crate) async fn start_engine(config: &MimicConfig, base_model: &Path) -> Result<Engine> {
    let device = config.inference.device.open()?;
    tracing::info!(device = ?device, dtype = %config.inference.dtype, "Initialized device");

    let total_memory = match config.inference.device_memory_bytes {
        Some(bytes) => bytes,
        None => device_total_memory(&device)?,
    };
    tracing::info!(total_gb = total_memory as f64 / (1u64 << 30) as f64, "Device memory");

    let meter = Arc::new(FootprintMeter::new(total_memory));
    let store = LlamaStore::new(device, config.dtype()?, Arc::clone(&meter)).with_base_dir(base_model);
    let cache = ModelCache::new(Arc::new(store), meter.clone(), &config.cache);

    let corpora = Arc::new(CsvCorpusStore::new(&config.paths.corpus_dir));
    let mut pipeline = InferencePipeline::new(
        config.generation.clone(),
        config.pipeline.clone(),
        corpora,
        meter,
    );

    if let Some(retrieval) = config.retrieval.clone() {
        let retriever = tokio::task::spawn_blocking(move || ChromaRetriever::from_config(&retrieval)).await??;
        pipeline = pipeline.with_retriever(Arc::new(retriever));
        tracing::info!("Retrieval enabled");
    }

    if let Some(rewrite) = config.rewrite.clone() {
        // The blocking client owns a runtime of its own and must be built off the async executor.
        let rewriter = tokio::task::spawn_blocking(move || OpenAiRewriter::from_config(&rewrite)).await??;
        pipeline = pipeline.with_rewriter(Arc::new(rewriter));
        tracing::info!("Rewrite enabled");
    }

    Ok(Engine::start(&config.engine, cache, pipeline)?)
}
