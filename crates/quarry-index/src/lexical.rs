//! Lexical retrieval over trigram full-text expressions.
//!
//! [`LexicalIndex`] is the query contract the pipeline consumes.
//! [`TrigramIndex`] is an in-memory BM25 engine over character trigrams
//! that accepts the expressions produced by
//! [`QueryNormalizer::normalize`](crate::tokenizer::QueryNormalizer::normalize).

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::chunk::{Chunk, Tag};
use crate::tokenizer::{char_ngrams, parse_expression, TRIGRAM_SIZE};

/// BM25 parameters
const K1: f64 = 1.2; // Term frequency saturation
const B: f64 = 0.75; // Length normalization

/// A request to a lexical index.
#[derive(Debug, Clone)]
pub struct LexicalQuery {
    /// Maximum number of chunks to return
    pub n: usize,
    /// Full-text expression (quoted trigrams joined with `OR`)
    pub text: String,
    /// Scopes to search; a chunk must belong to one of them
    pub tags: Vec<Tag>,
    /// Only return chunks under this directory
    pub directory: Option<String>,
}

/// Full-text search over indexed chunks.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Up to `query.n` chunks, best match first.
    async fn retrieve(&self, query: &LexicalQuery) -> Result<Vec<Chunk>>;
}

/// A chunk stored in the trigram index.
#[derive(Debug, Clone)]
struct Document {
    tag: Tag,
    chunk: Chunk,
    term_freqs: HashMap<String, usize>,
    length: usize,
}

#[derive(Debug, Default)]
struct Inner {
    /// Documents in insertion order
    documents: Vec<Document>,
    /// Document frequency of each trigram
    doc_freqs: HashMap<String, usize>,
    total_length: usize,
    doc_count: usize,
}

impl Inner {
    fn avg_length(&self) -> f64 {
        if self.doc_count == 0 {
            0.0
        } else {
            self.total_length as f64 / self.doc_count as f64
        }
    }

    fn idf(&self, term: &str) -> f64 {
        let doc_freq = self.doc_freqs.get(term).copied().unwrap_or(0) as f64;
        if doc_freq == 0.0 {
            return 0.0;
        }
        let n = self.doc_count as f64;
        ((n - doc_freq + 0.5) / (doc_freq + 0.5) + 1.0).ln()
    }

    fn score(&self, doc: &Document, terms: &[String]) -> f64 {
        let avg = self.avg_length();
        terms
            .iter()
            .filter_map(|term| {
                let tf = *doc.term_freqs.get(term)? as f64;
                let norm = if avg > 0.0 { doc.length as f64 / avg } else { 1.0 };
                Some(self.idf(term) * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * norm)))
            })
            .sum()
    }
}

/// In-memory BM25 index over lower-cased character trigrams.
#[derive(Debug, Default)]
pub struct TrigramIndex {
    inner: RwLock<Inner>,
}

impl TrigramIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn trigram_counts(text: &str) -> (HashMap<String, usize>, usize) {
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();
        let mut counts = HashMap::new();
        if chars.len() < TRIGRAM_SIZE {
            return (counts, 0);
        }
        for window in chars.windows(TRIGRAM_SIZE) {
            *counts.entry(window.iter().collect::<String>()).or_insert(0) += 1;
        }
        let length = chars.len() + 1 - TRIGRAM_SIZE;
        (counts, length)
    }

    /// Index a chunk under `tag`.
    pub async fn add_chunk(&self, tag: Tag, chunk: Chunk) {
        let (term_freqs, length) = Self::trigram_counts(&chunk.content);
        let mut inner = self.inner.write().await;
        for term in term_freqs.keys() {
            *inner.doc_freqs.entry(term.clone()).or_insert(0) += 1;
        }
        inner.total_length += length;
        inner.doc_count += 1;
        inner.documents.push(Document {
            tag,
            chunk,
            term_freqs,
            length,
        });
    }

    /// Index every chunk in `chunks` under `tag`.
    pub async fn add_chunks(&self, tag: &Tag, chunks: impl IntoIterator<Item = Chunk>) {
        for chunk in chunks {
            self.add_chunk(tag.clone(), chunk).await;
        }
    }

    /// Number of indexed chunks.
    pub async fn len(&self) -> usize {
        self.inner.read().await.doc_count
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl LexicalIndex for TrigramIndex {
    async fn retrieve(&self, query: &LexicalQuery) -> Result<Vec<Chunk>> {
        let terms: Vec<String> = {
            let mut seen = HashSet::new();
            parse_expression(&query.text)
                .into_iter()
                .flat_map(|term| char_ngrams(&term.to_lowercase(), TRIGRAM_SIZE))
                .filter(|term| seen.insert(term.clone()))
                .collect()
        };
        if terms.is_empty() || query.n == 0 || query.tags.is_empty() {
            return Ok(Vec::new());
        }

        let inner = self.inner.read().await;
        let mut scored: Vec<(usize, f64)> = inner
            .documents
            .iter()
            .enumerate()
            .filter(|(_, doc)| query.tags.contains(&doc.tag))
            .filter(|(_, doc)| {
                query
                    .directory
                    .as_deref()
                    .map_or(true, |dir| doc.chunk.is_under(dir))
            })
            .map(|(position, doc)| (position, inner.score(doc, &terms)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(query.n);

        debug!(terms = terms.len(), hits = scored.len(), "Trigram search");

        Ok(scored
            .into_iter()
            .map(|(position, _)| inner.documents[position].chunk.clone())
            .collect())
    }
}
