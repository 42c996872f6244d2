//! Semantic retrieval over chunk embeddings.
//!
//! [`VectorIndex`] is the query contract the pipeline consumes. Two engines
//! implement it: [`InMemoryVectorIndex`] for single-process use and tests,
//! and [`QdrantVectorIndex`] for a Qdrant collection.

pub mod qdrant;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::chunk::{Chunk, Tag};
use crate::embeddings::EmbeddingProvider;

pub use qdrant::{QdrantConfig, QdrantVectorIndex};

/// Nearest-neighbour search over embedded chunks.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embed `text` and return up to `n` chunks in `tags`, most similar first.
    async fn retrieve(
        &self,
        text: &str,
        n: usize,
        tags: &[Tag],
        directory: Option<&str>,
    ) -> Result<Vec<Chunk>>;
}

/// Cosine similarity of two vectors; 0 when either has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

struct Entry {
    tag: Tag,
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Brute-force cosine search over vectors held in memory.
pub struct InMemoryVectorIndex {
    embeddings: Arc<dyn EmbeddingProvider>,
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryVectorIndex {
    pub fn new(embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embeddings,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Embed and store `chunks` under `tag`, batching by the provider's limit.
    pub async fn add_chunks(&self, tag: &Tag, chunks: Vec<Chunk>) -> Result<usize> {
        let batch_size = self.embeddings.max_batch_size().max(1);
        let mut added = 0;

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embeddings.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                bail!(
                    "embedding provider returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                );
            }

            let mut entries = self.entries.write().await;
            for (chunk, vector) in batch.iter().zip(vectors) {
                entries.push(Entry {
                    tag: tag.clone(),
                    chunk: chunk.clone(),
                    vector,
                });
            }
            added += batch.len();
        }

        debug!(added, model = self.embeddings.model_name(), "Embedded chunks");
        Ok(added)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn retrieve(
        &self,
        text: &str,
        n: usize,
        tags: &[Tag],
        directory: Option<&str>,
    ) -> Result<Vec<Chunk>> {
        if n == 0 || tags.is_empty() {
            return Ok(Vec::new());
        }

        // Embed before taking the lock
        let query = self.embeddings.embed(text).await?;

        let entries = self.entries.read().await;
        let mut scored: Vec<(f32, &Entry)> = entries
            .iter()
            .filter(|e| tags.contains(&e.tag))
            .filter(|e| directory.map_or(true, |dir| e.chunk.is_under(dir)))
            .map(|e| (cosine_similarity(&query, &e.vector), e))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n);

        Ok(scored.into_iter().map(|(_, e)| e.chunk.clone()).collect())
    }
}
