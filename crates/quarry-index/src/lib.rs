//! Hybrid code context retrieval for quarry.
//!
//! This crate provides:
//! - Query normalization into a trigram full-text expression (Latin and CJK)
//! - Full-text retrieval over a trigram BM25 index
//! - Vector retrieval via an OpenAI-compatible embeddings API, in memory or in Qdrant
//! - Recently edited files as a fallback source
//! - Fusion and optional reranking via a `/rerank` endpoint

pub mod chunk;
pub mod chunker;
pub mod embeddings;
pub mod ide;
pub mod lexical;
pub mod pipeline;
pub mod recency;
pub mod reranker;
pub mod tokenizer;
pub mod vector;

// Re-exports
pub use chunk::{compute_digest, Chunk, Tag};
pub use chunker::{BasicChunker, ChunkDocument, Chunker};
pub use embeddings::{EmbeddingError, EmbeddingProvider, OpenAiEmbeddings};
pub use ide::{Ide, LocalIde};
pub use lexical::{LexicalIndex, LexicalQuery, TrigramIndex};
pub use pipeline::{
    build_pipeline, fuse_candidates, NoRerankerPipeline, RerankerPipeline, RetrievalBase,
    RetrievalPipeline, RetrievalPipelineOptions, RetrievalPipelineRunArguments, RetrievalSources,
};
pub use recency::{RecencySource, RecentlyEditedFiles};
pub use reranker::{HttpReranker, RerankError, Reranker};
pub use tokenizer::QueryNormalizer;
pub use vector::{InMemoryVectorIndex, QdrantConfig, QdrantVectorIndex, VectorIndex};
