//! Retrieval from a Chroma server
//!
//! Chroma's HTTP API only accepts embeddings, so the query is embedded
//! first through an OpenAI-compatible `/embeddings` endpoint. A missing
//! collection means the identity has no knowledge yet.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::Retriever;
use crate::config::RetrievalConfig;

/// Blocking client for per-identity Chroma collections
pub struct ChromaRetriever {
    client: reqwest::blocking::Client,
    config: RetrievalConfig,
    api_key: Option<String>,
}

impl ChromaRetriever {
    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(std::env::var(var).with_context(|| format!("{var} is not set"))?),
            None => None,
        };
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.config.embedding_url.trim_end_matches('/'));
        let mut request = self.client.post(url).json(&EmbeddingRequest {
            model: &self.config.embedding_model,
            input: [text],
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let body: EmbeddingResponse = request.send()?.error_for_status()?.json()?;
        body.data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| anyhow!("embedding response had no data"))
    }

    /// Collection id for `name`, `None` when it does not exist
    fn collection_id(&self, name: &str) -> Result<Option<String>> {
        let url = format!("{}/collections/{name}", self.api_base());
        let response = self.client.get(url).send()?;
        // Older servers answer an unknown name with 500 rather than 404.
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::INTERNAL_SERVER_ERROR) {
            return Ok(None);
        }
        let collection: Collection = response.error_for_status()?.json()?;
        Ok(Some(collection.id))
    }

    fn api_base(&self) -> String {
        format!("{}/api/v1", self.config.chroma_url.trim_end_matches('/'))
    }
}

impl Retriever for ChromaRetriever {
    fn retrieve(&self, identity: &str, query: &str) -> Result<String> {
        let name = self.config.collection_name(identity);
        let Some(id) = self.collection_id(&name)? else {
            tracing::debug!(identity, collection = %name, "No knowledge collection");
            return Ok(String::new());
        };

        let embedding = self.embed(query)?;
        let url = format!("{}/collections/{id}/query", self.api_base());
        let body: QueryResponse = self
            .client
            .post(url)
            .json(&QueryRequest {
                query_embeddings: vec![embedding],
                n_results: self.config.n_results,
                include: ["documents"],
            })
            .send()?
            .error_for_status()?
            .json()?;

        Ok(join_documents(body))
    }
}

/// Flatten the per-query document lists into one newline-separated block
fn join_documents(response: QueryResponse) -> String {
    response
        .documents
        .into_iter()
        .flatten()
        .flatten()
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct Collection {
    id: String,
}

#[derive(Serialize)]
struct QueryRequest {
    query_embeddings: Vec<Vec<f32>>,
    n_results: usize,
    include: [&'static str; 1],
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Vec<Vec<Option<String>>>,
}
