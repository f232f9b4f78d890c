
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::WebRagError;
use crate::embeddings::EMBEDDING_DIMENSION;

/// Upper bound on concurrently kept analysis indexes. Creating one past the
/// cap evicts the oldest surviving index first.
pub const MAX_INDEXES: usize = 5;

/// Number of chunks retrieved per question.
pub const TOP_K: usize = 5;

/// Records per batch when writing chunks to an index.
const UPSERT_BATCH_SIZE: usize = 100;

/// One embedded chunk ready for storage.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
}

/// A retrieved chunk with its similarity score (higher is better).
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub id: String,
    pub text: String,
    pub score: f32,
}

/// Vector store keeping one LanceDB table per analysis index.
///
/// Each `/analyze` run gets its own table, so questions only ever retrieve
/// from the analysis they belong to and eviction can drop a whole analysis
/// at once.
pub struct VectorStore {
    connection: Connection,
}

impl VectorStore {
    pub async fn open(path: &Path) -> crate::Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                WebRagError::Store(format!("Failed to create vector store directory: {e}"))
            })?;
        }

        let uri = format!("file://{}", path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| WebRagError::Store(format!("Failed to connect to LanceDB: {e}")))?;

        info!("Vector store initialized at {:?}", path);
        Ok(Self { connection })
    }

    /// Names of all existing analysis indexes.
    pub async fn index_names(&self) -> crate::Result<Vec<String>> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| WebRagError::Store(format!("Failed to list indexes: {e}")))
    }

    /// Create an index if it does not already exist. Idempotent: an existing
    /// index is left untouched, vectors and all.
    ///
    /// When the store is at capacity, the first-listed index is evicted to
    /// make room. Eviction is best-effort; a failed delete is logged and
    /// creation proceeds anyway.
    pub async fn ensure_index(&self, index_name: &str) -> crate::Result<()> {
        let names = self.index_names().await?;
        if names.iter().any(|n| n == index_name) {
            debug!("Index {index_name} exists");
            return Ok(());
        }

        if names.len() >= MAX_INDEXES {
            if let Some(to_delete) = names.first() {
                info!(
                    "Index limit reached ({} >= {MAX_INDEXES}). Deleting old index: {to_delete}",
                    names.len()
                );
                if let Err(e) = self.connection.drop_table(to_delete).await {
                    warn!("Error deleting index {to_delete}: {e}");
                }
            }
        }

        info!("Creating index {index_name}");
        self.connection
            .create_empty_table(index_name, chunk_schema())
            .execute()
            .await
            .map_err(|e| WebRagError::Store(format!("Failed to create index: {e}")))?;

        Ok(())
    }

    /// Append embedded chunks to an index.
    pub async fn upsert_chunks(
        &self,
        index_name: &str,
        records: &[ChunkRecord],
    ) -> crate::Result<()> {
        if records.is_empty() {
            debug!("No chunks to upsert into {index_name}");
            return Ok(());
        }

        let batches: Vec<RecordBatch> = records
            .chunks(UPSERT_BATCH_SIZE)
            .map(create_record_batch)
            .collect::<crate::Result<_>>()?;
        let table = self
            .connection
            .open_table(index_name)
            .execute()
            .await
            .map_err(|e| WebRagError::Store(format!("Failed to open index {index_name}: {e}")))?;

        debug!(
            "Upserting {} vectors to {index_name} in {} batches",
            records.len(),
            batches.len()
        );
        let reader = RecordBatchIterator::new(batches.into_iter().map(Ok), chunk_schema());
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| WebRagError::Store(format!("Failed to insert chunks: {e}")))?;

        info!("Stored {} chunks in {index_name}", records.len());
        Ok(())
    }

    /// Retrieve the `top_k` most similar chunks by cosine similarity,
    /// best match first.
    pub async fn query_top_k(
        &self,
        index_name: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> crate::Result<Vec<ScoredChunk>> {
        let table = self
            .connection
            .open_table(index_name)
            .execute()
            .await
            .map_err(|e| WebRagError::Store(format!("Failed to open index {index_name}: {e}")))?;

        let results = table
            .vector_search(query_vector)
            .map_err(|e| WebRagError::Store(format!("Failed to build vector search: {e}")))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| WebRagError::Store(format!("Failed to execute search: {e}")))?;

        parse_search_results(results).await
    }
}

fn chunk_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                EMBEDDING_DIMENSION as i32,
            ),
            false,
        ),
        Field::new("text", DataType::Utf8, false),
    ]))
}

fn create_record_batch(records: &[ChunkRecord]) -> crate::Result<RecordBatch> {
    let mut ids = Vec::with_capacity(records.len());
    let mut texts = Vec::with_capacity(records.len());
    let mut flat_values = Vec::with_capacity(records.len() * EMBEDDING_DIMENSION);

    for record in records {
        if record.vector.len() != EMBEDDING_DIMENSION {
            return Err(WebRagError::Store(format!(
                "Chunk {} has a {}-dimensional vector, expected {EMBEDDING_DIMENSION}",
                record.id,
                record.vector.len()
            )));
        }
        ids.push(record.id.as_str());
        texts.push(record.text.as_str());
        flat_values.extend_from_slice(&record.vector);
    }

    let values_array = Float32Array::from(flat_values);
    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        field,
        EMBEDDING_DIMENSION as i32,
        Arc::new(values_array),
        None,
    )
    .map_err(|e| WebRagError::Store(format!("Failed to create vector array: {e}")))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(texts)),
    ];

    RecordBatch::try_new(chunk_schema(), arrays)
        .map_err(|e| WebRagError::Store(format!("Failed to create record batch: {e}")))
}

async fn parse_search_results(
    mut results: lancedb::arrow::SendableRecordBatchStream,
) -> crate::Result<Vec<ScoredChunk>> {
    let mut chunks = Vec::new();

    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| WebRagError::Store(format!("Failed to read result stream: {e}")))?
    {
        chunks.extend(parse_search_batch(&batch)?);
    }

    debug!("Parsed {} search results", chunks.len());
    Ok(chunks)
}

fn parse_search_batch(batch: &RecordBatch) -> crate::Result<Vec<ScoredChunk>> {
    let ids = string_column(batch, "id")?;
    let texts = string_column(batch, "text")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut chunks = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });
        chunks.push(ScoredChunk {
            id: ids.value(row).to_string(),
            text: texts.value(row).to_string(),
            score: 1.0 - distance,
        });
    }

    Ok(chunks)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> crate::Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| WebRagError::Store(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| WebRagError::Store(format!("Invalid {name} column type")))
}
