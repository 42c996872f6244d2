use async_trait::async_trait;
use tracing::debug;

use super::{RetrievalBase, RetrievalPipeline, RetrievalPipelineRunArguments};
use crate::chunk::Chunk;

/// Pipeline that returns fused candidates in source priority order.
pub struct NoRerankerPipeline {
    base: RetrievalBase,
}

impl NoRerankerPipeline {
    pub fn new(base: RetrievalBase) -> Self {
        Self { base }
    }
}

#[async_trait]
impl RetrievalPipeline for NoRerankerPipeline {
    async fn run(&self, args: &RetrievalPipelineRunArguments) -> Vec<Chunk> {
        let mut chunks = self.base.retrieve_candidates(args).await;
        chunks.truncate(self.base.options().n_final);
        debug!(count = chunks.len(), "Retrieval run finished without reranking");
        chunks
    }
}
