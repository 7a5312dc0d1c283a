//! Vocabulary term extraction.
//!
//! The weight model keys term tables by bare vocabulary words: lower-case
//! alphabetic tokens of three or more characters, with common English stop
//! words removed.

use std::collections::HashMap;

/// Stop words excluded from term tables.
///
/// A compact subset of the usual English list; enough to keep glue words
/// from dominating the term weights.
const STOPWORDS: &[&str] = &[
    "about", "after", "all", "also", "and", "any", "are", "because", "been", "before", "being",
    "between", "both", "but", "can", "could", "did", "does", "doing", "down", "during", "each",
    "few", "for", "from", "further", "had", "has", "have", "having", "her", "here", "him", "his",
    "how", "into", "its", "just", "more", "most", "not", "now", "off", "once", "only", "other",
    "our", "out", "over", "own", "same", "she", "should", "some", "such", "than", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "those", "through", "too", "under",
    "until", "very", "was", "were", "what", "when", "where", "which", "while", "who", "whom",
    "why", "will", "with", "would", "you", "your",
];

/// Minimum token length kept as a term.
const MIN_TERM_LEN: usize = 3;

/// Extracts per-term frequencies from already lower-cased text.
#[must_use]
pub fn term_frequencies(text: &str) -> HashMap<String, u64> {
    let mut frequencies = HashMap::new();
    for token in text.split(|c: char| !c.is_alphabetic()) {
        if token.len() < MIN_TERM_LEN || STOPWORDS.binary_search(&token).is_ok() {
            continue;
        }
        *frequencies.entry(token.to_string()).or_insert(0) += 1;
    }
    frequencies
}

/// Extracts the distinct terms of a text, for weight lookups.
#[must_use]
pub fn terms(text: &str) -> Vec<String> {
    term_frequencies(text).into_keys().collect()
}
