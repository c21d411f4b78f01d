// LanceDB vector database module
// Handles vector storage and similarity search for runbook chunks

pub mod vector_store;

use serde::{Deserialize, Serialize};

pub use vector_store::{ScoredChunk, VectorIndex};

use crate::chunker::DocumentChunk;
use crate::corpus::DocumentCategory;

/// Build the composite key for a chunk: `document id + ordinal`.
///
/// Re-upserting the same key replaces the prior entry, which makes
/// re-indexing a document idempotent.
#[inline]
pub fn entry_id(document_id: &str, ordinal: usize) -> String {
    format!("{document_id}#{ordinal:04}")
}

/// The persisted unit in the vector index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Composite key: document id + ordinal
    pub id: String,
    /// The embedding vector
    pub vector: Vec<f32>,
    /// Chunk text and metadata stored alongside the vector
    pub metadata: ChunkMetadata,
}

/// Metadata for a chunk stored alongside its embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Identifier of the owning document
    pub document_id: String,
    /// Position of the chunk within the document
    pub ordinal: u32,
    /// Heading path (e.g. "Disk Full Runbook > Escalation Criteria")
    pub heading_path: Option<String>,
    /// The chunk text
    pub content: String,
    /// Estimated token count
    pub token_count: u32,
    /// Category of the owning document
    pub category: String,
    /// Timestamp when this entry was created
    pub created_at: String,
}

impl IndexEntry {
    /// Build an index entry from a chunk and its embedding vector
    #[inline]
    pub fn from_chunk(
        chunk: &DocumentChunk,
        category: DocumentCategory,
        vector: Vec<f32>,
        created_at: String,
    ) -> Self {
        Self {
            id: entry_id(&chunk.document_id, chunk.ordinal),
            vector,
            metadata: ChunkMetadata {
                document_id: chunk.document_id.clone(),
                ordinal: chunk.ordinal as u32,
                heading_path: Some(chunk.heading_path.clone()),
                content: chunk.content.clone(),
                token_count: chunk.token_count as u32,
                category: category.as_str().to_string(),
                created_at,
            },
        }
    }
}
