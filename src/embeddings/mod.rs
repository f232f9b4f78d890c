pub mod chunking;


use anyhow::{Context, Result, anyhow};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::WebRagError;

/// Dimension of the vectors produced by the remote embedding model.
pub const EMBEDDING_DIMENSION: usize = 768;

const REQUEST_TIMEOUT_SECONDS: u64 = 60;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    texts: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Client for a remote batch embedding service.
///
/// The service takes `{"texts": [...]}` and returns `{"embeddings": [...]}`
/// with one vector per input, in input order. Large inputs are split into
/// batches dispatched concurrently; results are concatenated back in batch
/// order so output index `i` always corresponds to input text `i`.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    http: reqwest::Client,
    api_url: String,
    batch_size: usize,
}

impl EmbeddingClient {
    pub fn new(api_url: &str, batch_size: usize) -> crate::Result<Self> {
        if batch_size == 0 {
            return Err(WebRagError::Config(
                "Embedding batch size must be at least 1".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()
            .map_err(|e| WebRagError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_url: api_url.to_string(),
            batch_size,
        })
    }

    async fn call_api(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .http
            .post(&self.api_url)
            .json(&EmbeddingRequest { texts })
            .send()
            .await
            .context("Failed to send embedding request")?
            .error_for_status()
            .context("Embedding request failed")?;

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("Invalid embedding response")?;

        if parsed.embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Embedding response returned {} vectors for {} texts",
                parsed.embeddings.len(),
                texts.len()
            ));
        }

        Ok(parsed.embeddings)
    }

    /// Embed every text, one vector per input in input order. Any batch
    /// failure fails the whole call; there are no partial results.
    pub async fn embed_many(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<&[String]> = texts.chunks(self.batch_size).collect();
        debug!(
            "Embedding {} texts in {} batches of up to {}",
            texts.len(),
            batches.len(),
            self.batch_size
        );

        let results = try_join_all(batches.into_iter().map(|batch| self.call_api(batch)))
            .await
            .map_err(|e| WebRagError::Embedding(e.to_string()))?;

        Ok(results.into_iter().flatten().collect())
    }

    pub async fn embed_one(&self, text: &str) -> crate::Result<Vec<f32>> {
        let texts = [text.to_string()];
        let vectors = self.embed_many(&texts).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| WebRagError::Embedding("Embedding response was empty".to_string()))
    }
}
