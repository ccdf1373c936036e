//! Relevance Retrieval
//!
//! Ranks paper chunks against a unit. The query is built from the unit's
//! name, signature, hints, and body (or from a short description in
//! `described` mode) and encoded in the index's own representation family.
//!
//! Ranking is pure with respect to the index: scores descending, ties
//! broken by chunk insertion order, `k = 0` yields nothing.

use serde::Serialize;
use tracing::{debug, warn};

use crate::corpus::{CorpusIndex, PaperChunk, QueryKey};
use crate::types::{ChunkId, IndexId, Result, SourceUnit};

/// One retrieved chunk with its similarity score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: PaperChunk,
    pub score: f32,
}

/// Top-K chunks for one unit, highest score first
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    /// Index the chunks were drawn from
    pub index: IndexId,
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    /// Result carrying no grounding material
    pub fn ungrounded(index: IndexId) -> Self {
        Self {
            index,
            hits: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn chunk_ids(&self) -> Vec<ChunkId> {
        self.hits.iter().map(|h| h.chunk.id.clone()).collect()
    }
}

/// Query text for a unit in `code` mode
pub fn query_for(unit: &SourceUnit) -> String {
    let mut parts = vec![unit.qualified_name().to_string(), unit.signature.clone()];
    if let Some(doc) = &unit.doc_comment {
        parts.push(doc.clone());
    }
    let hints = unit.hints();
    if !hints.is_empty() {
        parts.push(hints);
    }
    parts.push(unit.body.clone());
    parts.join("\n")
}

/// Retrieve the top `k` chunks for `unit`
pub async fn retrieve(unit: &SourceUnit, index: &CorpusIndex, k: usize) -> Result<RetrievalResult> {
    retrieve_text(&query_for(unit), index, k, f32::NEG_INFINITY).await
}

/// Retrieve the top `k` chunks for arbitrary query text.
///
/// Hits scoring below `min_score` are dropped after ranking.
pub async fn retrieve_text(
    query: &str,
    index: &CorpusIndex,
    k: usize,
    min_score: f32,
) -> Result<RetrievalResult> {
    if k == 0 || index.is_empty() {
        return Ok(RetrievalResult::ungrounded(index.id()));
    }

    let key = index.query_key(query).await?;
    let result = rank(index, &key, k, min_score);
    debug!(
        hits = result.len(),
        top = result.hits.first().map(|h| h.score).unwrap_or(0.0),
        "Retrieved chunks"
    );
    Ok(result)
}

/// Rank every chunk against `key` and keep the best `k`.
pub fn rank(index: &CorpusIndex, key: &QueryKey, k: usize, min_score: f32) -> RetrievalResult {
    if k == 0 {
        return RetrievalResult::ungrounded(index.id());
    }

    let scores = index.scores(key);
    if scores.len() != index.len() {
        warn!(
            scores = scores.len(),
            chunks = index.len(),
            "Score vector does not match chunk count"
        );
    }

    let mut order: Vec<usize> = (0..scores.len().min(index.len())).collect();
    // sort_by is stable, so equal scores keep insertion order
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let hits = order
        .into_iter()
        .filter(|&i| scores[i].is_finite() && scores[i] >= min_score)
        .take(k)
        .map(|i| ScoredChunk {
            chunk: index.chunks()[i].clone(),
            score: scores[i],
        })
        .collect();

    RetrievalResult {
        index: index.id(),
        hits,
    }
}
