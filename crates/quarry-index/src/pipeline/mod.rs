//! Retrieval pipelines: normalize, fan out, augment, fuse, rerank, truncate.
//!
//! Every variant shares the source plumbing in [`RetrievalBase`] and differs
//! only in what happens after fusion:
//!
//! - [`NoRerankerPipeline`] returns the fused candidates in priority order
//! - [`RerankerPipeline`] rescores them with a [`Reranker`] first
//!
//! A run never fails. Source errors are logged and count as no candidates,
//! so the worst outcome is an empty result.

mod base;
mod no_rerank;
mod rerank;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chunk::{Chunk, Tag};
use crate::embeddings::DEFAULT_MAX_CHUNK_SIZE;
use crate::reranker::Reranker;

pub use base::{RetrievalBase, RetrievalSources};
pub use no_rerank::NoRerankerPipeline;
pub use rerank::{rank_by_scores, RerankerPipeline};

/// Default candidates requested from each source.
pub const DEFAULT_N_RETRIEVE: usize = 25;

/// Default size of the final result.
pub const DEFAULT_N_FINAL: usize = 10;

/// Default cap on candidates sent to the reranker.
pub const DEFAULT_MAX_RERANK_CANDIDATES: usize = 50;

/// Arguments of a single retrieval run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalPipelineRunArguments {
    pub query: String,
    pub tags: Vec<Tag>,
    pub filter_directory: Option<String>,
}

/// Per-pipeline budgets and switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalPipelineOptions {
    /// Candidates requested from each source
    pub n_retrieve: usize,
    /// Maximum chunks returned by a run
    pub n_final: usize,
    /// Whether the vector source may be used
    pub include_embeddings: bool,
    /// Directory applied when a run does not set its own
    pub filter_directory: Option<String>,
    /// Chunk size used when chunking recent files
    pub max_chunk_size: usize,
    /// Fused candidates kept before reranking
    pub max_rerank_candidates: usize,
}

impl Default for RetrievalPipelineOptions {
    fn default() -> Self {
        Self {
            n_retrieve: DEFAULT_N_RETRIEVE,
            n_final: DEFAULT_N_FINAL,
            include_embeddings: true,
            filter_directory: None,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            max_rerank_candidates: DEFAULT_MAX_RERANK_CANDIDATES,
        }
    }
}

/// A retrieval strategy.
#[async_trait]
pub trait RetrievalPipeline: Send + Sync {
    /// Chunks relevant to `args.query`, best first, at most `n_final` of them.
    async fn run(&self, args: &RetrievalPipelineRunArguments) -> Vec<Chunk>;
}

/// Merge candidate lists in priority order, keeping the first chunk seen
/// for each identity.
///
/// Chunks with different identities are kept even if their line ranges
/// overlap.
pub fn fuse_candidates<I>(sources: I) -> Vec<Chunk>
where
    I: IntoIterator<Item = Vec<Chunk>>,
{
    let mut seen: HashSet<(String, usize)> = HashSet::new();
    let mut fused = Vec::new();
    for chunk in sources.into_iter().flatten() {
        let (digest, index) = chunk.identity();
        if seen.insert((digest.to_string(), index)) {
            fused.push(chunk);
        }
    }
    fused
}

/// Pick the pipeline variant for the configured collaborators.
pub fn build_pipeline(
    base: RetrievalBase,
    reranker: Option<Arc<dyn Reranker>>,
) -> Box<dyn RetrievalPipeline> {
    match reranker {
        Some(reranker) => Box::new(RerankerPipeline::new(base, reranker)),
        None => Box::new(NoRerankerPipeline::new(base)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(digest: &str, index: usize, content: &str) -> Chunk {
        Chunk {
            digest: digest.to_string(),
            content: content.to_string(),
            filepath: format!("/repo/{digest}.rs"),
            start_line: 0,
            end_line: 10,
            index,
        }
    }

    #[test]
    fn test_fusion_prefers_earlier_sources() {
        let lexical = vec![chunk("a", 0, "from lexical")];
        let vector = vec![chunk("b", 0, "b"), chunk("a", 0, "from vector")];
        let fused = fuse_candidates([lexical, vector]);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].content, "from lexical");
        assert_eq!(fused[1].digest, "b");
    }

    #[test]
    fn test_fusion_is_idempotent() {
        let set = vec![chunk("a", 0, "x"), chunk("b", 0, "y"), chunk("a", 1, "z")];
        let once = fuse_candidates([set.clone()]);
        let twice = fuse_candidates([once.clone(), once.clone()]);
        assert_eq!(once, set);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_overlapping_ranges_are_not_merged() {
        let mut edited = chunk("a-v2", 0, "same text");
        edited.filepath = "/repo/a.rs".to_string();
        let mut original = chunk("a-v1", 0, "same text");
        original.filepath = "/repo/a.rs".to_string();
        assert_eq!(fuse_candidates([vec![original], vec![edited]]).len(), 2);
    }

    #[test]
    fn test_options_default() {
        let options = RetrievalPipelineOptions::default();
        assert_eq!(options.n_retrieve, DEFAULT_N_RETRIEVE);
        assert_eq!(options.n_final, DEFAULT_N_FINAL);
        assert_eq!(options.max_rerank_candidates, DEFAULT_MAX_RERANK_CANDIDATES);
        assert!(options.include_embeddings);
    }
}
