// Indexer module
// Walks the runbook corpus and keeps the vector index in sync with it


use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::chunker::{ChunkingConfig, chunk_document};
use crate::corpus::{CorpusDocument, MarkdownCorpus};
use crate::database::lancedb::{IndexEntry, VectorIndex};
use crate::database::sqlite::{Database, NewDocumentRecord};
use crate::embeddings::EmbeddingProvider;

/// Outcome of a re-index run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    /// Per-document failures: (document id or path, error message)
    pub failed: Vec<(String, String)>,
}

impl IndexSummary {
    #[inline]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Incremental indexer for the runbook corpus.
///
/// Change detection is a content-hash diff against the persisted fingerprint
/// table, never a timestamp comparison.
pub struct Indexer {
    corpus: MarkdownCorpus,
    database: Database,
    vector_index: Arc<VectorIndex>,
    embeddings: Arc<dyn EmbeddingProvider>,
    chunking_config: ChunkingConfig,
}

impl Indexer {
    #[inline]
    pub fn new(
        corpus: MarkdownCorpus,
        database: Database,
        vector_index: Arc<VectorIndex>,
        embeddings: Arc<dyn EmbeddingProvider>,
        chunking_config: ChunkingConfig,
    ) -> Self {
        Self {
            corpus,
            database,
            vector_index,
            embeddings,
            chunking_config,
        }
    }

    /// Re-index the corpus.
    ///
    /// Only documents whose fingerprint differs from the persisted one are
    /// re-processed unless `force` is set. Each document's update is atomic
    /// with respect to readers; a failure in one document is reported in the
    /// summary and does not abort the run. Documents that disappeared from
    /// the corpus are removed from the index.
    #[inline]
    pub async fn reindex(&self, force: bool) -> Result<IndexSummary> {
        let listing = self
            .corpus
            .enumerate()
            .context("Failed to enumerate runbook corpus")?;

        info!(
            "Re-indexing {} runbooks (force: {})",
            listing.documents.len(),
            force
        );

        let mut summary = IndexSummary {
            failed: listing.failures,
            ..IndexSummary::default()
        };

        let existing: HashMap<String, String> = self
            .database
            .list_documents()
            .await
            .context("Failed to load persisted fingerprints")?
            .into_iter()
            .map(|record| (record.id, record.fingerprint))
            .collect();

        let mut seen: HashSet<String> = HashSet::with_capacity(listing.documents.len());

        for document in &listing.documents {
            seen.insert(document.id.clone());

            let previous = existing.get(&document.id);
            if !force && previous.is_some_and(|fingerprint| *fingerprint == document.fingerprint) {
                debug!("Runbook {} is unchanged, skipping", document.id);
                summary.unchanged += 1;
                continue;
            }

            match self.index_document(document).await {
                Ok(chunk_count) => {
                    info!("Indexed runbook {} ({} chunks)", document.id, chunk_count);
                    if previous.is_some() {
                        summary.updated += 1;
                    } else {
                        summary.added += 1;
                    }
                }
                Err(e) => {
                    warn!("Failed to index runbook {}: {:#}", document.id, e);
                    summary.failed.push((document.id.clone(), format!("{:#}", e)));
                }
            }
        }

        // Tombstone cleanup: fingerprints without a corpus counterpart
        for document_id in existing.keys().filter(|id| !seen.contains(*id)) {
            match self.remove_document(document_id).await {
                Ok(()) => {
                    info!("Removed runbook {} from index", document_id);
                    summary.deleted += 1;
                }
                Err(e) => {
                    warn!("Failed to remove runbook {}: {:#}", document_id, e);
                    summary
                        .failed
                        .push((document_id.clone(), format!("{:#}", e)));
                }
            }
        }

        info!(
            "Re-index complete: {} added, {} updated, {} deleted, {} unchanged, {} failed",
            summary.added,
            summary.updated,
            summary.deleted,
            summary.unchanged,
            summary.failed.len()
        );

        Ok(summary)
    }

    /// Index a single document: chunk, embed, replace its index entries, and
    /// persist the new fingerprint.
    ///
    /// Embeddings are generated before anything is deleted, so an embedding
    /// failure leaves the document's old chunks untouched. The fingerprint is
    /// only persisted after the vector store accepted the new chunks; a
    /// storage failure therefore leaves the document marked stale and the
    /// next run retries it (the composite-key upsert makes the retry
    /// idempotent).
    async fn index_document(&self, document: &CorpusDocument) -> Result<usize> {
        let chunks = chunk_document(document, &self.chunking_config);
        debug!("Chunked {} into {} chunks", document.id, chunks.len());

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let vectors = self
            .embeddings
            .embed_batch(&texts)
            .context("Failed to embed chunks")?;

        if vectors.len() != chunks.len() {
            anyhow::bail!(
                "Embedding count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            );
        }

        let created_at = Utc::now().to_rfc3339();
        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                IndexEntry::from_chunk(chunk, document.category, vector, created_at.clone())
            })
            .collect();

        self.vector_index
            .replace_document(&document.id, &entries)
            .await
            .context("Failed to store chunks in vector index")?;

        self.database
            .upsert_document(NewDocumentRecord {
                id: document.id.clone(),
                category: document.category.as_str().to_string(),
                fingerprint: document.fingerprint.clone(),
                chunk_count: entries.len() as i64,
            })
            .await
            .context("Failed to persist document fingerprint")?;

        Ok(entries.len())
    }

    async fn remove_document(&self, document_id: &str) -> Result<()> {
        self.vector_index
            .delete_by_document(document_id)
            .await
            .context("Failed to delete document entries from vector index")?;

        self.database
            .delete_document(document_id)
            .await
            .context("Failed to delete document fingerprint")?;

        Ok(())
    }
}
