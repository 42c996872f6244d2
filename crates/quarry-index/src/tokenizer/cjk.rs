//! Dictionary-based segmentation for queries containing CJK text.

use jieba_rs::Jieba;
use once_cell::sync::Lazy;

use super::stopwords::{is_chinese_stop_word, is_english_stop_word};
use super::Tokenizer;

// Loading the bundled dictionary takes a while; share one per process.
static JIEBA: Lazy<Jieba> = Lazy::new(Jieba::new);

/// Segments with jieba, drops punctuation and stop words.
#[derive(Debug, Default, Clone, Copy)]
pub struct CjkTokenizer;

impl CjkTokenizer {
    fn is_punctuation(token: &str) -> bool {
        !token.chars().any(char::is_alphanumeric)
    }
}

impl Tokenizer for CjkTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        JIEBA
            .cut(text, true)
            .into_iter()
            .map(str::trim)
            .filter(|token| !token.is_empty() && !Self::is_punctuation(token))
            .map(str::to_lowercase)
            .filter(|token| !is_chinese_stop_word(token) && !is_english_stop_word(token))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_and_strips_punctuation() {
        let tokens = CjkTokenizer.tokenize("解析JSON文件，读取配置！");
        assert!(tokens.iter().all(|t| !t.contains('，') && !t.contains('！')));
        assert!(tokens.contains(&"json".to_string()));
        assert!(tokens.iter().any(|t| t.contains("解析")));
    }

    #[test]
    fn test_strips_stop_words() {
        let tokens = CjkTokenizer.tokenize("如何的配置");
        assert!(!tokens.contains(&"的".to_string()));
        assert!(!tokens.contains(&"如何".to_string()));
    }
}
