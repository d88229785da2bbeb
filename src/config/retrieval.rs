//! Retrieval collaborator settings

use serde::{Deserialize, Serialize};

/// Chroma server holding one collection per identity, plus the endpoint
/// that embeds queries the same way the collections were embedded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Base URL of the Chroma server
    #[serde(default = "default_chroma_url")]
    pub chroma_url: String,

    /// Collections are named `<prefix><identity>`
    #[serde(default = "default_collection_prefix")]
    pub collection_prefix: String,

    /// Documents returned per query
    #[serde(default = "default_n_results")]
    pub n_results: usize,

    /// OpenAI-compatible base URL serving `/embeddings`
    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Environment variable with a bearer token for the embedding endpoint
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_chroma_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_collection_prefix() -> String {
    "collection_".to_string()
}

fn default_n_results() -> usize {
    3
}

fn default_embedding_url() -> String {
    "http://localhost:8081/v1".to_string()
}

fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_timeout() -> u64 {
    10
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chroma_url: default_chroma_url(),
            collection_prefix: default_collection_prefix(),
            n_results: default_n_results(),
            embedding_url: default_embedding_url(),
            embedding_model: default_embedding_model(),
            api_key_env: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl RetrievalConfig {
    /// Collection holding `identity`'s knowledge
    pub fn collection_name(&self, identity: &str) -> String {
        format!("{}{}", self.collection_prefix, identity)
    }
}
