use super::*;
use crate::database::lancedb::{ChunkMetadata, IndexEntry, entry_id};
use tempfile::TempDir;

const AXES: [&str; 4] = ["disk", "memory", "timeout", "cpu"];

fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut vector: Vec<f32> = AXES
        .iter()
        .map(|axis| lower.matches(axis).count() as f32)
        .collect();
    vector.push(0.25);

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    for value in &mut vector {
        *value /= norm;
    }
    vector
}

#[derive(Debug, Default)]
struct StubEmbedder;

impl EmbeddingProvider for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub-embedder"
    }

    fn dimension(&self) -> usize {
        AXES.len() + 1
    }

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(keyword_vector(text))
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

fn entry(document_id: &str, ordinal: usize, content: &str) -> IndexEntry {
    IndexEntry {
        id: entry_id(document_id, ordinal),
        vector: keyword_vector(content),
        metadata: ChunkMetadata {
            document_id: document_id.to_string(),
            ordinal: ordinal as u32,
            heading_path: Some("Runbook".to_string()),
            content: content.to_string(),
            token_count: 12,
            category: "infrastructure".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
        },
    }
}

async fn create_test_retriever() -> (Retriever, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let embeddings = Arc::new(StubEmbedder);
    let vector_index = Arc::new(
        VectorIndex::new(temp_dir.path().join("vectors"), embeddings.dimension())
            .await
            .expect("should create vector index"),
    );

    vector_index
        .upsert(&[
            entry(
                "infrastructure/disk-full.md",
                0,
                "disk usage high, free disk space, disk cleanup",
            ),
            entry(
                "infrastructure/memory-pressure.md",
                0,
                "memory usage high, oom killer, restart the memory hog",
            ),
            entry(
                "application/request-timeouts.md",
                0,
                "upstream timeout, connection pool exhausted, timeout tuning",
            ),
        ])
        .await
        .expect("upsert should succeed");

    (Retriever::new(vector_index, embeddings), temp_dir)
}

#[tokio::test]
async fn ranks_most_relevant_document_first() {
    let (retriever, _temp_dir) = create_test_retriever().await;

    let result = retriever
        .search("server disk full at 95%", 5, 0.3)
        .await
        .expect("search should succeed");

    assert!(!result.is_empty());
    assert_eq!(
        result.chunks[0].metadata.document_id,
        "infrastructure/disk-full.md"
    );
}

#[tokio::test]
async fn respects_top_k() {
    let (retriever, _temp_dir) = create_test_retriever().await;

    let result = retriever
        .search("disk memory timeout", 1, 0.0)
        .await
        .expect("search should succeed");

    assert_eq!(result.len(), 1);
}

#[tokio::test]
async fn threshold_yields_empty_result_not_error() {
    let (retriever, _temp_dir) = create_test_retriever().await;

    // No axis keywords: the query vector only carries the bias component
    let result = retriever
        .search("database replication lag", 5, 0.5)
        .await
        .expect("search should succeed");

    assert!(result.is_empty());
}

#[tokio::test]
async fn search_is_deterministic() {
    let (retriever, _temp_dir) = create_test_retriever().await;

    let first = retriever
        .search("memory leak on worker", 5, 0.1)
        .await
        .expect("search should succeed");
    let second = retriever
        .search("memory leak on worker", 5, 0.1)
        .await
        .expect("search should succeed");

    let ids = |result: &RetrievalResult| -> Vec<String> {
        result
            .chunks
            .iter()
            .map(|c| entry_id(&c.metadata.document_id, c.metadata.ordinal as usize))
            .collect()
    };

    assert_eq!(ids(&first), ids(&second));
}

#[tokio::test]
async fn source_documents_deduplicate_in_rank_order() {
    let (retriever, _temp_dir) = create_test_retriever().await;

    let result = retriever
        .search("disk and more disk plus memory", 5, 0.0)
        .await
        .expect("search should succeed");

    let sources = result.source_documents();
    assert!(!sources.is_empty());
    assert_eq!(sources[0], "infrastructure/disk-full.md");
    let unique: std::collections::HashSet<&&str> = sources.iter().collect();
    assert_eq!(unique.len(), sources.len());
}
