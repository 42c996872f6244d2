use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{RetrievalBase, RetrievalPipeline, RetrievalPipelineRunArguments};
use crate::chunk::Chunk;
use crate::reranker::Reranker;

/// Pipeline that rescores fused candidates with a [`Reranker`].
///
/// If the reranker fails, the fused order is used instead.
pub struct RerankerPipeline {
    base: RetrievalBase,
    reranker: Arc<dyn Reranker>,
}

impl RerankerPipeline {
    pub fn new(base: RetrievalBase, reranker: Arc<dyn Reranker>) -> Self {
        Self { base, reranker }
    }
}

/// Order `chunks` by descending score. Ties keep their input order and
/// NaN scores sort last.
pub fn rank_by_scores(chunks: Vec<Chunk>, scores: &[f32]) -> Vec<Chunk> {
    let mut scored: Vec<(f32, Chunk)> = scores
        .iter()
        .map(|s| if s.is_nan() { f32::NEG_INFINITY } else { *s })
        .zip(chunks)
        .collect();

    // sort_by is stable, so equal scores stay in fused order
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    scored.into_iter().map(|(_, chunk)| chunk).collect()
}

#[async_trait]
impl RetrievalPipeline for RerankerPipeline {
    async fn run(&self, args: &RetrievalPipelineRunArguments) -> Vec<Chunk> {
        let options = self.base.options();
        let mut candidates = self.base.retrieve_candidates(args).await;
        if candidates.is_empty() {
            return candidates;
        }
        // Nothing to score against; recency order stands
        if args.query.trim().is_empty() {
            candidates.truncate(options.n_final);
            return candidates;
        }
        candidates.truncate(options.max_rerank_candidates.max(options.n_final));

        let mut ranked = match self.reranker.rerank(&args.query, &candidates).await {
            Ok(scores) if scores.len() == candidates.len() => rank_by_scores(candidates, &scores),
            Ok(scores) => {
                warn!(
                    expected = candidates.len(),
                    got = scores.len(),
                    "Reranker returned the wrong number of scores, keeping fused order"
                );
                candidates
            }
            Err(e) => {
                warn!(error = %e, "Reranking failed, keeping fused order");
                candidates
            }
        };

        ranked.truncate(options.n_final);
        debug!(count = ranked.len(), "Retrieval run finished with reranking");
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(digest: &str) -> Chunk {
        Chunk {
            digest: digest.to_string(),
            content: digest.to_string(),
            filepath: format!("/repo/{digest}.rs"),
            start_line: 0,
            end_line: 0,
            index: 0,
        }
    }

    fn digests(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.digest.as_str()).collect()
    }

    #[test]
    fn test_rank_by_scores_descending() {
        let ranked = rank_by_scores(vec![chunk("a"), chunk("b"), chunk("c")], &[0.1, 0.9, 0.5]);
        assert_eq!(digests(&ranked), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_rank_by_scores_ties_are_stable() {
        let ranked = rank_by_scores(vec![chunk("a"), chunk("b"), chunk("c")], &[0.5, 0.5, 0.7]);
        assert_eq!(digests(&ranked), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_rank_by_scores_nan_last() {
        let ranked = rank_by_scores(vec![chunk("a"), chunk("b")], &[f32::NAN, -3.0]);
        assert_eq!(digests(&ranked), vec!["b", "a"]);
    }
}
