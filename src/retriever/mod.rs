// Retriever module
// Query-side semantic search over the vector index

#[cfg(test)]
mod tests;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::database::lancedb::{ScoredChunk, VectorIndex};
use crate::embeddings::EmbeddingProvider;
use crate::{Result, TriageError};

/// Ranked, thresholded chunk matches for a query.
///
/// Chunks are ordered by descending score; ties break by document id then
/// ordinal, so results are deterministic for a stable index snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunks: Vec<ScoredChunk>,
}

impl RetrievalResult {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Distinct source documents, in rank order
    #[inline]
    pub fn source_documents(&self) -> Vec<&str> {
        let mut sources = Vec::new();
        for chunk in &self.chunks {
            let id = chunk.metadata.document_id.as_str();
            if !sources.contains(&id) {
                sources.push(id);
            }
        }
        sources
    }
}

/// Semantic search front end over the vector index.
///
/// The query is embedded with the same provider used at index time; keeping
/// the two models aligned is a deployment invariant, not something checked
/// at runtime.
pub struct Retriever {
    vector_index: Arc<VectorIndex>,
    embeddings: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    #[inline]
    pub fn new(vector_index: Arc<VectorIndex>, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            vector_index,
            embeddings,
        }
    }

    /// Search the index for chunks relevant to the query text.
    ///
    /// Index unavailability (including failure to embed the query) is a hard
    /// error: retrieval is a pipeline precondition, not a quality concern.
    #[inline]
    pub async fn search(
        &self,
        query_text: &str,
        top_k: usize,
        min_score: f32,
    ) -> Result<RetrievalResult> {
        debug!(
            "Searching runbooks: query length {}, top_k {}, min_score {}",
            query_text.len(),
            top_k,
            min_score
        );

        let query_vector = self
            .embeddings
            .embed(query_text)
            .map_err(|e| TriageError::Embedding(format!("Failed to embed query: {:#}", e)))?;

        let chunks = self.vector_index.query(&query_vector, top_k, min_score).await?;

        debug!("Retrieved {} chunks above threshold", chunks.len());
        Ok(RetrievalResult { chunks })
    }
}
