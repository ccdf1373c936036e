//! Lexical representation: token-frequency signatures scored with Okapi BM25.

use std::collections::{HashMap, HashSet};

use crate::constants::bm25::{B, K1, MIN_TOKEN_CHARS, STOPWORDS};

/// Split text into lowercase retrieval terms.
///
/// Breaks on non-alphanumerics, `_` and camelCase humps so that code
/// identifiers (`quickSort`, `merge_sort`) meet prose (`quick sort`).
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in text.chars() {
        if c.is_alphanumeric() {
            if c.is_uppercase() && prev_lower {
                flush(&mut current, &mut tokens);
            }
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
            current.extend(c.to_lowercase());
        } else {
            prev_lower = false;
            flush(&mut current, &mut tokens);
        }
    }
    flush(&mut current, &mut tokens);
    tokens
}

fn flush(current: &mut String, tokens: &mut Vec<String>) {
    if current.chars().count() >= MIN_TOKEN_CHARS
        && !current.chars().all(|c| c.is_ascii_digit())
        && !STOPWORDS.contains(&current.as_str())
    {
        tokens.push(std::mem::take(current));
    } else {
        current.clear();
    }
}

/// Per-chunk term frequencies plus corpus statistics for BM25.
#[derive(Debug, Clone, Default)]
pub struct LexicalIndex {
    term_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<usize>,
    doc_freq: HashMap<String, usize>,
    avg_len: f32,
}

impl LexicalIndex {
    pub fn build<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut index = Self::default();

        for text in texts {
            let tokens = tokenize(text);
            let mut freqs: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *freqs.entry(token.clone()).or_default() += 1;
            }
            for term in freqs.keys() {
                *index.doc_freq.entry(term.clone()).or_default() += 1;
            }
            index.doc_lens.push(tokens.len());
            index.term_freqs.push(freqs);
        }

        let total: usize = index.doc_lens.iter().sum();
        index.avg_len = if index.doc_lens.is_empty() {
            0.0
        } else {
            total as f32 / index.doc_lens.len() as f32
        };
        index
    }

    pub fn len(&self) -> usize {
        self.term_freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.term_freqs.is_empty()
    }

    /// Distinct terms across the corpus
    pub fn vocabulary_size(&self) -> usize {
        self.doc_freq.len()
    }

    /// Query terms, deduplicated so a term repeated in a body counts once
    pub fn query_terms(text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        tokenize(text)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }

    /// BM25 score of every chunk, in insertion order
    pub fn scores(&self, terms: &[String]) -> Vec<f32> {
        let n = self.len() as f32;
        let mut scores = vec![0.0f32; self.len()];
        if self.avg_len <= 0.0 {
            return scores;
        }

        for term in terms {
            let Some(&df) = self.doc_freq.get(term) else {
                continue;
            };
            let idf = (1.0 + (n - df as f32 + 0.5) / (df as f32 + 0.5)).ln();

            for (i, freqs) in self.term_freqs.iter().enumerate() {
                let Some(&tf) = freqs.get(term) else {
                    continue;
                };
                let tf = tf as f32;
                let norm = 1.0 - B + B * self.doc_lens[i] as f32 / self.avg_len;
                scores[i] += idf * tf * (K1 + 1.0) / (tf + K1 * norm);
            }
        }
        scores
    }
}
