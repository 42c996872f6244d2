//! Tokenizer for queries without CJK text: stem, keep words, drop stop words.

use rust_stemmers::{Algorithm, Stemmer};
use unicode_segmentation::UnicodeSegmentation;

use super::stopwords::is_english_stop_word;
use super::Tokenizer;

/// Porter2 stemming over Unicode word boundaries.
pub struct LatinTokenizer {
    stemmer: Stemmer,
}

impl LatinTokenizer {
    pub fn new() -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::English),
        }
    }

    /// Words start with a letter and contain only letters, digits,
    /// underscores and inner apostrophes. Numbers and symbols are not words.
    fn is_word(token: &str) -> bool {
        let mut chars = token.chars();
        match chars.next() {
            Some(first) if first.is_alphabetic() => {
                chars.all(|c| c.is_alphanumeric() || c == '_' || c == '\'' || c == '\u{2019}')
            }
            _ => false,
        }
    }
}

impl Default for LatinTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for LatinTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.unicode_words()
            .map(|word| word.to_lowercase())
            .filter(|word| Self::is_word(word) && !is_english_stop_word(word))
            .map(|word| self.stemmer.stem(&word).into_owned())
            .filter(|stem| !stem.is_empty() && !is_english_stop_word(stem))
            .collect()
    }
}
