//! Vector retrieval backed by a Qdrant collection.
//!
//! Points are expected to carry the chunk fields plus the `branch` and
//! `directory` of the tag they were indexed under.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::condition::ConditionOneOf;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{Condition, Filter, SearchPointsBuilder, Value};
use qdrant_client::Qdrant;
use tracing::{debug, info};

use super::VectorIndex;
use crate::chunk::{Chunk, Tag};
use crate::embeddings::EmbeddingProvider;

/// Default Qdrant collection name
pub const DEFAULT_COLLECTION: &str = "quarry-chunks";

/// Extra hits fetched per requested result when a directory post-filter applies.
pub const QDRANT_DIRECTORY_OVERSAMPLE: usize = 4;

/// Configuration for connecting to Qdrant.
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    /// Qdrant server URL
    pub url: String,

    /// API key (optional)
    pub api_key: Option<String>,

    /// Collection name
    pub collection_name: String,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
            collection_name: DEFAULT_COLLECTION.to_string(),
        }
    }
}

/// Qdrant-backed [`VectorIndex`].
pub struct QdrantVectorIndex {
    client: Qdrant,
    collection_name: String,
    embeddings: Arc<dyn EmbeddingProvider>,
}

impl QdrantVectorIndex {
    /// Create a client for `config.collection_name`.
    pub fn from_config(config: &QdrantConfig, embeddings: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let mut builder = Qdrant::from_url(&config.url).skip_compatibility_check();

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder.build().context("Failed to connect to Qdrant")?;

        info!(url = %config.url, collection = %config.collection_name, "Connected to Qdrant");

        Ok(Self {
            client,
            collection_name: config.collection_name.clone(),
            embeddings,
        })
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }
}

/// A chunk is in scope if it matches any tag's branch and directory.
pub(crate) fn tag_filter(tags: &[Tag]) -> Filter {
    let per_tag: Vec<Condition> = tags
        .iter()
        .map(|tag| Condition {
            condition_one_of: Some(ConditionOneOf::Filter(Filter::must(vec![
                Condition::matches("branch", tag.branch.clone()),
                Condition::matches("directory", tag.directory.clone()),
            ]))),
        })
        .collect();
    Filter::should(per_tag)
}

fn extract_string(map: &HashMap<String, Value>, key: &str) -> String {
    map.get(key)
        .and_then(|v| match &v.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

fn extract_usize(map: &HashMap<String, Value>, key: &str) -> usize {
    map.get(key)
        .and_then(|v| match &v.kind {
            Some(Kind::IntegerValue(i)) => usize::try_from(*i).ok(),
            _ => None,
        })
        .unwrap_or(0)
}

/// Rebuild a chunk from a point payload.
///
/// Points written without a `digest` are keyed by file path and start line
/// so distinct hits stay distinct during fusion. Points with neither a
/// digest nor a file path cannot be told apart and yield `None`.
pub(crate) fn payload_to_chunk(map: &HashMap<String, Value>) -> Option<Chunk> {
    let filepath = extract_string(map, "filepath");
    let start_line = extract_usize(map, "start_line");
    let mut digest = extract_string(map, "digest");
    if digest.is_empty() {
        if filepath.is_empty() {
            debug!("Skipping Qdrant point with neither digest nor file path");
            return None;
        }
        debug!(filepath = %filepath, "Qdrant point has no digest, keying it by file path");
        digest = format!("{filepath}:{start_line}");
    }

    Some(Chunk {
        digest,
        content: extract_string(map, "content"),
        filepath,
        start_line,
        end_line: extract_usize(map, "end_line"),
        index: extract_usize(map, "index"),
    })
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
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

        let query_vector = self.embeddings.embed(text).await?;

        let limit = match directory {
            Some(_) => n * QDRANT_DIRECTORY_OVERSAMPLE,
            None => n,
        };

        let search = SearchPointsBuilder::new(&self.collection_name, query_vector, limit as u64)
            .with_payload(true)
            .filter(tag_filter(tags));

        let results = self
            .client
            .search_points(search)
            .await
            .context("Failed to search points")?;

        let chunks: Vec<Chunk> = results
            .result
            .iter()
            .filter_map(|point| payload_to_chunk(&point.payload))
            .filter(|chunk| directory.map_or(true, |dir| chunk.is_under(dir)))
            .take(n)
            .collect();

        debug!(hits = results.result.len(), kept = chunks.len(), "Qdrant search");
        Ok(chunks)
    }
}
