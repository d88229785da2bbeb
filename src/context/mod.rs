//! Prompt context collaborators
//!
//! - [`CorpusStore`]: an identity's training corpora, read as example rows
//! - [`Retriever`]: knowledge snippets relevant to the current input

mod chroma;
mod corpus;

pub use chroma::ChromaRetriever;
pub use corpus::CsvCorpusStore;

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// One historical exchange from a training corpus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub input: String,
    pub output: String,
}

/// Training corpora per identity
pub trait CorpusStore: Send + Sync {
    /// Handles of every corpus owned by `identity`
    fn list_corpora(&self, identity: &str) -> Result<Vec<PathBuf>>;

    /// All rows of one corpus, oldest first
    fn read_examples(&self, corpus: &Path) -> Result<Vec<Example>>;
}

/// Knowledge retrieval for an identity
pub trait Retriever: Send + Sync {
    /// Content relevant to `query`; empty when nothing matches
    fn retrieve(&self, identity: &str, query: &str) -> Result<String>;
}

/// Retriever used when no knowledge base is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRetrieval;

impl Retriever for NoRetrieval {
    fn retrieve(&self, _identity: &str, _query: &str) -> Result<String> {
        Ok(String::new())
    }
}
