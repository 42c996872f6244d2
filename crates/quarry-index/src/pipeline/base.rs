use std::sync::Arc;

use tracing::{debug, warn};

use super::{fuse_candidates, RetrievalPipelineOptions, RetrievalPipelineRunArguments};
use crate::chunk::Chunk;
use crate::chunker::Chunker;
use crate::ide::Ide;
use crate::lexical::{LexicalIndex, LexicalQuery};
use crate::recency::{RecencySource, RecentlyEditedFiles};
use crate::tokenizer::QueryNormalizer;
use crate::vector::VectorIndex;

/// Collaborators a pipeline reads from.
pub struct RetrievalSources {
    pub lexical: Arc<dyn LexicalIndex>,
    /// `None` when no embeddings model is configured
    pub vector: Option<Arc<dyn VectorIndex>>,
    pub recent: Arc<RecentlyEditedFiles>,
    pub ide: Arc<dyn Ide>,
    pub chunker: Arc<dyn Chunker>,
}

/// Source plumbing shared by every pipeline variant.
pub struct RetrievalBase {
    options: RetrievalPipelineOptions,
    normalizer: QueryNormalizer,
    lexical: Arc<dyn LexicalIndex>,
    vector: Option<Arc<dyn VectorIndex>>,
    recency: RecencySource,
}

impl RetrievalBase {
    pub fn new(options: RetrievalPipelineOptions, sources: RetrievalSources) -> Self {
        let recency = RecencySource::new(
            sources.recent,
            sources.ide,
            sources.chunker,
            options.max_chunk_size,
        );
        Self {
            options,
            normalizer: QueryNormalizer::new(),
            lexical: sources.lexical,
            vector: sources.vector,
            recency,
        }
    }

    pub fn options(&self) -> &RetrievalPipelineOptions {
        &self.options
    }

    /// Whether the vector source takes part in runs.
    pub fn embeddings_enabled(&self) -> bool {
        self.options.include_embeddings && self.vector.is_some()
    }

    fn directory<'a>(&'a self, args: &'a RetrievalPipelineRunArguments) -> Option<&'a str> {
        args.filter_directory
            .as_deref()
            .or(self.options.filter_directory.as_deref())
    }

    /// Up to `n` full-text matches. Never touches the index for a query
    /// with nothing searchable in it.
    pub async fn retrieve_lexical(&self, args: &RetrievalPipelineRunArguments, n: usize) -> Vec<Chunk> {
        if args.query.trim().is_empty() {
            return Vec::new();
        }

        let text = self.normalizer.normalize(&args.query);
        if text.is_empty() {
            debug!("Query has no searchable terms, skipping lexical retrieval");
            return Vec::new();
        }

        let query = LexicalQuery {
            n,
            text,
            tags: args.tags.clone(),
            directory: self.directory(args).map(str::to_string),
        };

        match self.lexical.retrieve(&query).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "Lexical retrieval failed");
                Vec::new()
            }
        }
    }

    /// Up to `n` nearest chunks, or nothing when embeddings are off.
    pub async fn retrieve_embeddings(&self, args: &RetrievalPipelineRunArguments, n: usize) -> Vec<Chunk> {
        if !self.options.include_embeddings || args.query.trim().is_empty() {
            return Vec::new();
        }
        let Some(vector) = &self.vector else {
            return Vec::new();
        };

        match vector
            .retrieve(&args.query, n, &args.tags, self.directory(args))
            .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "Vector retrieval failed");
                Vec::new()
            }
        }
    }

    /// Up to `n` chunks of recently edited and open files.
    pub async fn retrieve_recent(&self, n: usize) -> Vec<Chunk> {
        self.recency.most_recent(n).await
    }

    /// Recency fills in when there is no usable query signal.
    fn needs_recency(&self, args: &RetrievalPipelineRunArguments, found_any: bool) -> bool {
        args.query.trim().is_empty() || !self.embeddings_enabled() || !found_any
    }

    /// Fused candidates from every applicable source, lexical first, then
    /// vector, then recency.
    pub async fn retrieve_candidates(&self, args: &RetrievalPipelineRunArguments) -> Vec<Chunk> {
        if args.tags.is_empty() {
            warn!("Retrieval run has no tags, returning nothing");
            return Vec::new();
        }

        let n = self.options.n_retrieve;
        let (lexical, vector) = tokio::join!(
            self.retrieve_lexical(args, n),
            self.retrieve_embeddings(args, n)
        );

        let found_any = !lexical.is_empty() || !vector.is_empty();
        let recent = if self.needs_recency(args, found_any) {
            self.retrieve_recent(n).await
        } else {
            Vec::new()
        };

        debug!(
            lexical = lexical.len(),
            vector = vector.len(),
            recent = recent.len(),
            "Retrieved candidates"
        );

        fuse_candidates([lexical, vector, recent])
    }
}
