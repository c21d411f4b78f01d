// Embedding capability module
// Text-to-vector mapping used at both index time and query time

pub mod ollama;

use anyhow::Result;

pub use ollama::OllamaEmbeddingClient;

/// Capability interface for mapping text to fixed-size dense vectors.
///
/// The model and dimension are fixed for the lifetime of an index; querying
/// with a different model than the one used at index time silently degrades
/// retrieval quality, so deployments must keep the two aligned.
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier of the embedding model
    fn model_name(&self) -> &str;

    /// Dimensionality of produced vectors
    fn dimension(&self) -> usize;

    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, preserving input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
