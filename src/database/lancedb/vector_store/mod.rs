
use super::{ChunkMetadata, IndexEntry};
use crate::TriageError;
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const TABLE_NAME: &str = "chunks";

/// Extra results fetched beyond `top_k` so threshold filtering and
/// deterministic tie ordering operate on a stable candidate pool
const QUERY_OVERSAMPLE: usize = 4;

/// Vector index over runbook chunks, backed by LanceDB.
///
/// Mutations commit durably before returning; there is no write-behind
/// buffering. Concurrent mutations serialize on an internal write lock so a
/// document's chunk set is replaced atomically from a reader's point of view;
/// queries never take the lock.
pub struct VectorIndex {
    connection: Connection,
    vector_dimension: usize,
    write_lock: Mutex<()>,
}

/// Search result from vector similarity search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub metadata: ChunkMetadata,
    /// Cosine similarity mapped to `1 - distance` (higher is better)
    pub score: f32,
}

impl VectorIndex {
    /// Open (or create) the vector index at the given path.
    ///
    /// The vector dimension is fixed for the lifetime of the index and must
    /// match the embedding model used at both index and query time.
    #[inline]
    pub async fn new<P: AsRef<Path>>(db_path: P, vector_dimension: usize) -> Result<Self, TriageError> {
        let db_path = db_path.as_ref();
        debug!("Initializing LanceDB at path: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TriageError::Database(format!("Failed to create vector database directory: {}", e))
            })?;
        }

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri).execute().await.map_err(|e| {
            TriageError::Database(format!("Failed to connect to LanceDB: {}", e))
        })?;

        let index = Self {
            connection,
            vector_dimension,
            write_lock: Mutex::new(()),
        };
        index.initialize_table().await?;

        info!("Vector index initialized successfully");
        Ok(index)
    }

    async fn initialize_table(&self) -> Result<(), TriageError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| TriageError::Database(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&TABLE_NAME.to_string()) {
            debug!("Chunks table already exists");
            return Ok(());
        }

        info!(
            "Creating chunks table with {} dimensions",
            self.vector_dimension
        );

        let schema = self.create_schema();
        self.connection
            .create_empty_table(TABLE_NAME, schema)
            .execute()
            .await
            .map_err(|e| TriageError::Database(format!("Failed to create table: {}", e)))?;

        Ok(())
    }

    fn create_schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.vector_dimension as i32,
                ),
                false,
            ),
            Field::new("document_id", DataType::Utf8, false),
            Field::new("ordinal", DataType::UInt32, false),
            Field::new("heading_path", DataType::Utf8, true),
            Field::new("content", DataType::Utf8, false),
            Field::new("token_count", DataType::UInt32, false),
            Field::new("category", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    async fn open_table(&self) -> Result<lancedb::Table, TriageError> {
        self.connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| TriageError::Database(format!("Failed to open table: {}", e)))
    }

    /// Insert or replace entries, keyed by their composite ids.
    ///
    /// Upserting the same `(document id, ordinal)` twice leaves exactly one
    /// entry with the later values.
    #[inline]
    pub async fn upsert(&self, entries: &[IndexEntry]) -> Result<(), TriageError> {
        if entries.is_empty() {
            debug!("No entries to upsert");
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        self.upsert_locked(entries).await
    }

    async fn upsert_locked(&self, entries: &[IndexEntry]) -> Result<(), TriageError> {
        debug!("Upserting batch of {} entries", entries.len());

        let table = self.open_table().await?;

        let id_list = entries
            .iter()
            .map(|entry| format!("'{}'", escape_literal(&entry.id)))
            .join(", ");
        table
            .delete(&format!("id IN ({id_list})"))
            .await
            .map_err(|e| {
                TriageError::Database(format!("Failed to delete existing entries: {}", e))
            })?;

        let record_batch = self.create_record_batch(entries)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| TriageError::Database(format!("Failed to insert entries: {}", e)))?;

        info!("Successfully upserted {} entries", entries.len());
        Ok(())
    }

    /// Remove all entries belonging to a document.
    ///
    /// Used before re-upserting a changed document and for documents removed
    /// from the corpus.
    #[inline]
    pub async fn delete_by_document(&self, document_id: &str) -> Result<(), TriageError> {
        let _guard = self.write_lock.lock().await;
        self.delete_by_document_locked(document_id).await
    }

    async fn delete_by_document_locked(&self, document_id: &str) -> Result<(), TriageError> {
        debug!("Deleting entries for document: {}", document_id);

        let table = self.open_table().await?;
        let predicate = format!("document_id = '{}'", escape_literal(document_id));
        table.delete(&predicate).await.map_err(|e| {
            TriageError::Database(format!("Failed to delete document entries: {}", e))
        })?;

        info!("Deleted entries for document: {}", document_id);
        Ok(())
    }

    /// Replace a document's entries in one locked step: delete everything
    /// under the document id, then insert the new entries.
    ///
    /// Readers observe either the old chunk set or the new one, never a mix
    /// of both.
    #[inline]
    pub async fn replace_document(
        &self,
        document_id: &str,
        entries: &[IndexEntry],
    ) -> Result<(), TriageError> {
        let _guard = self.write_lock.lock().await;
        self.delete_by_document_locked(document_id).await?;
        if entries.is_empty() {
            return Ok(());
        }
        self.upsert_locked(entries).await
    }

    /// Nearest-neighbor search under cosine distance.
    ///
    /// Returns at most `top_k` entries, all with score >= `min_score`,
    /// ordered by descending score with ties broken by document id then
    /// ordinal. An empty result is not an error.
    #[inline]
    pub async fn query(
        &self,
        query_vector: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredChunk>, TriageError> {
        debug!("Searching for similar vectors with top_k: {}", top_k);

        let table = self.open_table().await?;

        let fetch_limit = top_k.saturating_mul(QUERY_OVERSAMPLE).max(16);
        let query = table
            .vector_search(query_vector)
            .map_err(|e| TriageError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(fetch_limit);

        let mut stream = query
            .execute()
            .await
            .map_err(|e| TriageError::Database(format!("Failed to execute search: {}", e)))?;

        let mut results = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| TriageError::Database(format!("Failed to read result stream: {}", e)))?
        {
            results.extend(parse_search_batch(&batch)?);
        }

        results.retain(|chunk| chunk.score >= min_score);
        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.metadata.document_id.cmp(&b.metadata.document_id))
                .then_with(|| a.metadata.ordinal.cmp(&b.metadata.ordinal))
        });
        results.truncate(top_k);

        debug!("Query returned {} results above threshold", results.len());
        Ok(results)
    }

    /// Total number of entries in the index
    #[inline]
    pub async fn count(&self) -> Result<u64, TriageError> {
        let table = self.open_table().await?;

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| TriageError::Database(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    fn create_record_batch(&self, entries: &[IndexEntry]) -> Result<RecordBatch, TriageError> {
        let len = entries.len();
        let vector_dim = self.vector_dimension;

        let mut ids = Vec::with_capacity(len);
        let mut document_ids = Vec::with_capacity(len);
        let mut ordinals = Vec::with_capacity(len);
        let mut heading_paths = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut token_counts = Vec::with_capacity(len);
        let mut categories = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        let mut flat_values = Vec::with_capacity(len * vector_dim);
        for entry in entries {
            if entry.vector.len() != vector_dim {
                return Err(TriageError::Database(format!(
                    "Vector dimension mismatch: expected {}, got {} for entry {}",
                    vector_dim,
                    entry.vector.len(),
                    entry.id
                )));
            }

            ids.push(entry.id.as_str());
            flat_values.extend_from_slice(&entry.vector);
            document_ids.push(entry.metadata.document_id.as_str());
            ordinals.push(entry.metadata.ordinal);
            heading_paths.push(entry.metadata.heading_path.as_deref());
            contents.push(entry.metadata.content.as_str());
            token_counts.push(entry.metadata.token_count);
            categories.push(entry.metadata.category.as_str());
            created_ats.push(entry.metadata.created_at.as_str());
        }

        let schema = self.create_schema();

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
                .map_err(|e| {
                    TriageError::Database(format!("Failed to create vector array: {}", e))
                })?;

        let arrays: Vec<Arc<dyn arrow::array::Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(document_ids)),
            Arc::new(UInt32Array::from(ordinals)),
            Arc::new(StringArray::from(heading_paths)),
            Arc::new(StringArray::from(contents)),
            Arc::new(UInt32Array::from(token_counts)),
            Arc::new(StringArray::from(categories)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(schema, arrays)
            .map_err(|e| TriageError::Database(format!("Failed to create record batch: {}", e)))
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<ScoredChunk>, TriageError> {
    let num_rows = batch.num_rows();
    let mut results = Vec::with_capacity(num_rows);

    let document_ids = string_column(batch, "document_id")?;
    let ordinals = uint32_column(batch, "ordinal")?;
    let heading_paths = string_column(batch, "heading_path")?;
    let contents = string_column(batch, "content")?;
    let token_counts = uint32_column(batch, "token_count")?;
    let categories = string_column(batch, "category")?;
    let created_ats = string_column(batch, "created_at")?;

    let distances = batch
        .column_by_name("_distance")
        .map(|col| col.as_any().downcast_ref::<Float32Array>());

    for row in 0..num_rows {
        let metadata = ChunkMetadata {
            document_id: document_ids.value(row).to_string(),
            ordinal: ordinals.value(row),
            heading_path: if heading_paths.is_null(row) {
                None
            } else {
                Some(heading_paths.value(row).to_string())
            },
            content: contents.value(row).to_string(),
            token_count: token_counts.value(row),
            category: categories.value(row).to_string(),
            created_at: created_ats.value(row).to_string(),
        };

        let distance = distances
            .flatten()
            .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        // Convert cosine distance to similarity score (higher is better)
        results.push(ScoredChunk {
            metadata,
            score: 1.0 - distance,
        });
    }

    Ok(results)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, TriageError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| TriageError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| TriageError::Database(format!("Invalid {} column type", name)))
}

fn uint32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array, TriageError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| TriageError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| TriageError::Database(format!("Invalid {} column type", name)))
}
