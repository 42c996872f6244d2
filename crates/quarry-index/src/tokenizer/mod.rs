//! Query normalization into a full-text search expression.
//!
//! A query is cleaned into tokens by one of two tokenizers, picked by
//! whether the text contains CJK ideographs:
//!
//! - [`LatinTokenizer`] stems and drops numbers, symbols and English stop words
//! - [`CjkTokenizer`] segments with a dictionary and drops punctuation and stop words
//!
//! The deduplicated tokens are joined with spaces and cut into overlapping
//! character trigrams, which is what the trigram full-text engine indexes.
//! The trigrams are OR-ed together so any partial overlap scores.

pub mod cjk;
pub mod latin;
mod stopwords;

use std::collections::HashSet;

pub use cjk::CjkTokenizer;
pub use latin::LatinTokenizer;

/// Width of the sliding window used to build the lexical expression.
pub const TRIGRAM_SIZE: usize = 3;

/// Turns free text into cleaned search tokens.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// True if `text` contains a CJK unified ideograph.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(c as u32,
            0x3400..=0x4DBF   // Extension A
            | 0x4E00..=0x9FFF // Unified Ideographs
            | 0xF900..=0xFAFF // Compatibility Ideographs
        )
    })
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove repeated tokens, keeping the first occurrence.
pub fn dedup_tokens(tokens: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .into_iter()
        .filter(|token| seen.insert(token.clone()))
        .collect()
}

/// Overlapping character windows of `size` over `text`, each emitted once.
pub fn char_ngrams(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if size == 0 || chars.len() < size {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    chars
        .windows(size)
        .map(|window| window.iter().collect::<String>())
        .filter(|gram| seen.insert(gram.clone()))
        .collect()
}

/// Quote a term as an FTS phrase.
fn quote(term: &str) -> String {
    format!("\"{}\"", term.replace('"', "\"\""))
}

/// Builds lexical search expressions from user queries.
pub struct QueryNormalizer {
    latin: LatinTokenizer,
    cjk: CjkTokenizer,
}

impl QueryNormalizer {
    pub fn new() -> Self {
        Self {
            latin: LatinTokenizer::new(),
            cjk: CjkTokenizer,
        }
    }

    fn tokenizer_for(&self, text: &str) -> &dyn Tokenizer {
        if contains_cjk(text) {
            &self.cjk
        } else {
            &self.latin
        }
    }

    /// Cleaned, deduplicated tokens of `query`.
    pub fn tokens(&self, query: &str) -> Vec<String> {
        let text = collapse_whitespace(query);
        if text.is_empty() {
            return Vec::new();
        }
        dedup_tokens(self.tokenizer_for(&text).tokenize(&text))
    }

    /// Trigram windows of the cleaned query.
    pub fn trigrams(&self, query: &str) -> Vec<String> {
        char_ngrams(&self.tokens(query).join(" "), TRIGRAM_SIZE)
    }

    /// The full-text expression for `query`, or an empty string if nothing
    /// searchable is left after cleaning.
    pub fn normalize(&self, query: &str) -> String {
        self.trigrams(query)
            .iter()
            .map(|gram| quote(gram))
            .collect::<Vec<_>>()
            .join(" OR ")
    }
}

impl Default for QueryNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Split an expression built by [`QueryNormalizer::normalize`] back into its terms.
pub fn parse_expression(expression: &str) -> Vec<String> {
    expression
        .split(" OR ")
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(|term| {
            let inner = term
                .strip_prefix('"')
                .and_then(|t| t.strip_suffix('"'))
                .unwrap_or(term);
            inner.replace("\"\"", "\"")
        })
        .collect()
}
