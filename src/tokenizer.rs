//! Text → term normalization.
//!
//! Tokenization is a collaborator of the evaluator, not part of it: the parser, the feature
//! builder and [`MemoryIndex`](crate::index::MemoryIndex) all take a `&dyn Tokenizer` so a
//! caller can plug in whatever stemming/stopword policy its index was built with.

use std::collections::HashSet;

/// Turns raw text into the normalized term sequence an index was built with.
pub trait Tokenizer {
    /// Normalize `text`. An empty result means the input was entirely stopwords/punctuation.
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Small default English stopword list (the common Lucene/SMART core).
pub const DEFAULT_STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Lowercasing, non-alphanumeric splitting tokenizer with stopword removal.
///
/// No stemming: stems are whatever the index stored.
#[derive(Debug, Clone)]
pub struct SimpleTokenizer {
    stopwords: HashSet<String>,
}

impl Default for SimpleTokenizer {
    fn default() -> Self {
        Self::with_stopwords(DEFAULT_STOPWORDS.iter().copied())
    }
}

impl SimpleTokenizer {
    /// Tokenizer that keeps every term.
    pub fn without_stopwords() -> Self {
        Self {
            stopwords: HashSet::new(),
        }
    }

    /// Tokenizer with a caller-supplied stopword list (matched after lowercasing).
    pub fn with_stopwords<'a>(words: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            stopwords: words.into_iter().map(str::to_lowercase).collect(),
        }
    }

    /// Whether `term` (already lowercased) is a stopword.
    pub fn is_stopword(&self, term: &str) -> bool {
        self.stopwords.contains(term)
    }
}

impl Tokenizer for SimpleTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty() && !self.is_stopword(s))
            .map(String::from)
            .collect()
    }
}
