use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Anything that is neither a word character (in any script) nor whitespace.
static SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]+").expect("separator pattern must compile"));

/// Korean particles and request verbs that carry no retrieval signal.
pub const STOP_WORDS: &[&str] = &[
    "을", "를", "이", "가", "은", "는", "의", "에", "좀", "줘", "로", "바꿔줘", "알려줘",
    "사용법", "말고", "대신", "관련된", "대한", "대해",
];

/// Unique keywords in first-occurrence order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeywordSet {
    words: Vec<String>,
}

impl KeywordSet {
    #[must_use]
    pub fn contains(&self, word: &str) -> bool {
        self.words.iter().any(|w| w == word)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.words
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Number of keywords found as substrings of `haystack` (already lower-cased).
    #[must_use]
    pub fn count_in(&self, haystack: &str) -> usize {
        self.words
            .iter()
            .filter(|word| haystack.contains(word.as_str()))
            .count()
    }
}

#[derive(Clone, Debug)]
pub struct KeywordExtractor {
    stop_words: HashSet<String>,
}

impl KeywordExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stop_words: STOP_WORDS.iter().map(|w| (*w).to_string()).collect(),
        }
    }

    #[must_use]
    pub fn with_extra_stop_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.stop_words
            .extend(words.into_iter().map(|w| w.as_ref().to_lowercase()));
        self
    }

    #[must_use]
    pub fn extract(&self, text: &str) -> KeywordSet {
        let lowered = text.to_lowercase();
        let normalized = SEPARATORS.replace_all(&lowered, " ");

        let mut seen = HashSet::new();
        let words = normalized
            .split_whitespace()
            .filter(|word| word.chars().count() > 1)
            .filter(|word| !self.stop_words.contains(*word))
            .filter(|word| seen.insert(*word))
            .map(str::to_string)
            .collect();

        KeywordSet { words }
    }
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Keywords of `text` with the builtin stop-word list.
#[must_use]
pub fn extract_keywords(text: &str) -> KeywordSet {
    KeywordExtractor::new().extract(text)
}
