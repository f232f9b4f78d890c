
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::WebRagError;
use crate::embeddings::EmbeddingClient;
use crate::embeddings::chunking::{ChunkingConfig, chunk_text};
use crate::llm::{ChatTurn, LlmClient};
use crate::scrape::{PageExtractor, fetch_and_combine};
use crate::store::{ChunkRecord, TOP_K, VectorStore};

/// Fixed answer for questions the index has nothing on. Returned without
/// calling the LLM.
pub const NO_CONTEXT_ANSWER: &str = "This information is not available in the indexed documents.";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Result of a completed analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub index_name: String,
    pub summary: String,
}

/// Orchestrates the full pipeline: scrape, optimize, chunk, embed, store,
/// then answer questions against the stored chunks.
pub struct RagService {
    store: Arc<VectorStore>,
    embeddings: EmbeddingClient,
    llm: LlmClient,
    extractor: Arc<dyn PageExtractor>,
    chunking: ChunkingConfig,
}

impl RagService {
    pub fn new(
        store: Arc<VectorStore>,
        embeddings: EmbeddingClient,
        llm: LlmClient,
        extractor: Arc<dyn PageExtractor>,
    ) -> Self {
        Self {
            store,
            embeddings,
            llm,
            extractor,
            chunking: ChunkingConfig::default(),
        }
    }

    /// Scrape the given URLs into a fresh analysis index and return its name
    /// together with an analyst summary of the ingested content.
    pub async fn analyze(&self, urls: &[String]) -> crate::Result<AnalysisOutcome> {
        if urls.is_empty() {
            return Err(WebRagError::InvalidRequest("No URLs provided.".to_string()));
        }

        info!("Received analyze request for {} URLs", urls.len());

        let combined = fetch_and_combine(self.extractor.as_ref(), urls).await;
        if combined.trim().is_empty() {
            return Err(WebRagError::Scrape(
                "Failed to extract content from provided URLs.".to_string(),
            ));
        }

        let index_name = new_index_name();
        self.store.ensure_index(&index_name).await?;

        let optimized = self.llm.optimize_for_retrieval(&combined).await;
        self.index_text(&index_name, &optimized).await?;

        let summary = self.llm.summarize(&optimized).await;

        info!("Analyze complete. Index: {index_name}");
        Ok(AnalysisOutcome {
            index_name,
            summary,
        })
    }

    /// Chunk, embed, and store a document under an existing index.
    async fn index_text(&self, index_name: &str, text: &str) -> crate::Result<()> {
        let chunks = chunk_text(text, &self.chunking);
        info!("Embedding {} chunks for {index_name}", chunks.len());

        let vectors = self.embeddings.embed_many(&chunks).await?;
        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (text, vector))| ChunkRecord {
                id: format!("doc_{i}_{}", short_hex()),
                vector,
                text,
            })
            .collect();

        self.store.upsert_chunks(index_name, &records).await
    }

    /// Answer a question from an analysis index.
    ///
    /// The question is embedded, the top matching chunks are joined into a
    /// context block, and the LLM answers from that context. Retrieval
    /// failures and empty indexes both produce [`NO_CONTEXT_ANSWER`] rather
    /// than an error; only embedding the question can fail the call.
    pub async fn ask(
        &self,
        index_name: &str,
        question: &str,
        history: &[ChatTurn],
    ) -> crate::Result<String> {
        if index_name.trim().is_empty() {
            return Err(WebRagError::InvalidRequest(
                "index_name required".to_string(),
            ));
        }

        let query_vector = self.embeddings.embed_one(question).await?;

        let context = match self.store.query_top_k(index_name, &query_vector, TOP_K).await {
            Ok(chunks) => chunks
                .iter()
                .map(|chunk| chunk.text.as_str())
                .collect::<Vec<_>>()
                .join(CONTEXT_SEPARATOR),
            Err(e) => {
                warn!("Vector search error: {e}");
                String::new()
            }
        };

        if context.trim().is_empty() {
            return Ok(NO_CONTEXT_ANSWER.to_string());
        }

        Ok(self.llm.answer_with_context(question, &context, history).await)
    }

    pub fn llm(&self) -> &LlmClient {
        &self.llm
    }
}

fn new_index_name() -> String {
    format!("webindex-{}", short_hex())
}

fn short_hex() -> String {
    let mut hex = Uuid::new_v4().simple().to_string();
    hex.truncate(8);
    hex
}
