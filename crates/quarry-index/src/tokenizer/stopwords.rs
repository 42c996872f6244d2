//! Stop-word lists for query cleaning.

use std::collections::HashSet;

use once_cell::sync::Lazy;

const ENGLISH: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves", "don't", "doesn't", "isn't", "can't", "won't", "i'm", "it's", "let's",
];

const CHINESE: &[&str] = &[
    "的", "了", "和", "是", "在", "我", "有", "就", "不", "人", "都", "一", "一个", "上", "也",
    "很", "到", "说", "要", "去", "你", "会", "着", "没有", "看", "好", "自己", "这", "那",
    "这个", "那个", "什么", "怎么", "如何", "为什么", "哪里", "哪个", "吗", "呢", "吧", "啊",
    "把", "被", "让", "给", "从", "对", "与", "及", "或", "而", "但", "并", "等", "以及", "其",
    "中", "里", "请", "帮", "帮我", "一下", "能", "可以", "之", "所", "为", "以",
];

static ENGLISH_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| ENGLISH.iter().copied().collect());

static CHINESE_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| CHINESE.iter().copied().collect());

pub fn is_english_stop_word(token: &str) -> bool {
    ENGLISH_SET.contains(token)
}

pub fn is_chinese_stop_word(token: &str) -> bool {
    CHINESE_SET.contains(token)
}
