// Embeddings module
// The `Embedder` seam plus the Ollama-backed implementation

pub mod ollama;

pub use ollama::OllamaClient;

use anyhow::Result;
use async_trait::async_trait;

/// Maps text to fixed-length dense vectors.
///
/// Implementations return exactly one vector per input, in input order.
/// Nothing is cached: every call reaches the model.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    #[inline]
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        match vectors.len() {
            1 => Ok(vectors.remove(0)),
            n => Err(anyhow::anyhow!(
                "Embedder returned {} vectors for a single input",
                n
            )),
        }
    }
}
