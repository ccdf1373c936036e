//! Corpus Index
//!
//! Built once per run, before any unit is dispatched, then shared
//! read-only. Every chunk gets one relevance key of the configured
//! family: a BM25 term signature or a dense vector.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument};

use super::embedding::{Embedder, cosine_similarity, create_embedder};
use super::lexical::LexicalIndex;
use super::{Chunker, LoadedPapers, Paper, PaperChunk, load_papers};
use crate::analyzer::SkippedFile;
use crate::config::{CorpusConfig, Representation};
use crate::storage::{EmbeddingCache, SharedEmbeddingCache};
use crate::types::{IndexId, PaperdocError, Result};

/// Query-side relevance key, same family as the index it was made for
#[derive(Debug, Clone, PartialEq)]
pub enum QueryKey {
    Lexical(Vec<String>),
    Dense(Vec<f32>),
}

/// Corpus statistics reported with the run
#[derive(Debug, Clone, Default, Serialize)]
pub struct CorpusStats {
    pub papers: usize,
    pub chunks: usize,
    pub representation: String,
    /// Distinct terms (lexical) or vector dimensions (embedding)
    pub dimensions: usize,
    /// Chunks embedded during this build
    pub embedded: usize,
    /// Chunks whose vectors came from the cache
    pub cached: usize,
    /// Chunks holding an algorithm block
    pub algorithm_chunks: usize,
    /// Chunks holding a numbered equation
    pub formula_chunks: usize,
    pub skipped: Vec<SkippedFile>,
    pub build_ms: u64,
}

enum IndexKeys {
    Lexical(LexicalIndex),
    Dense {
        embedder: Arc<dyn Embedder>,
        vectors: Vec<Vec<f32>>,
    },
}

/// The run's immutable paper index.
pub struct CorpusIndex {
    id: IndexId,
    chunks: Vec<PaperChunk>,
    keys: IndexKeys,
    stats: CorpusStats,
}

impl fmt::Debug for CorpusIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorpusIndex")
            .field("id", &self.id)
            .field("chunks", &self.chunks.len())
            .field("representation", &self.representation())
            .finish()
    }
}

impl CorpusIndex {
    /// Index over no papers; every retrieval is empty.
    pub fn empty() -> Self {
        Self::lexical(Vec::new(), CorpusStats::default())
    }

    fn lexical(chunks: Vec<PaperChunk>, mut stats: CorpusStats) -> Self {
        let keys = LexicalIndex::build(chunks.iter().map(|c| c.text.as_str()));
        stats.representation = Representation::Lexical.to_string();
        stats.dimensions = keys.vocabulary_size();
        stats.chunks = chunks.len();
        Self {
            id: IndexId::new(),
            chunks,
            keys: IndexKeys::Lexical(keys),
            stats,
        }
    }

    pub fn id(&self) -> IndexId {
        self.id
    }

    /// Chunks in insertion order
    pub fn chunks(&self) -> &[PaperChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn stats(&self) -> &CorpusStats {
        &self.stats
    }

    pub fn representation(&self) -> Representation {
        match self.keys {
            IndexKeys::Lexical(_) => Representation::Lexical,
            IndexKeys::Dense { .. } => Representation::Embedding,
        }
    }

    /// Compute the query key for `text`.
    ///
    /// Dense indexes embed the query with the embedder that built them;
    /// an empty index never calls it.
    pub async fn query_key(&self, text: &str) -> Result<QueryKey> {
        match &self.keys {
            IndexKeys::Lexical(_) => Ok(QueryKey::Lexical(LexicalIndex::query_terms(text))),
            IndexKeys::Dense { .. } if self.chunks.is_empty() => Ok(QueryKey::Dense(Vec::new())),
            IndexKeys::Dense { embedder, .. } => {
                let mut vectors = embedder.embed(&[text.to_string()]).await?;
                vectors
                    .pop()
                    .map(QueryKey::Dense)
                    .ok_or_else(|| PaperdocError::Embedding("empty embedding response".into()))
            }
        }
    }

    /// Similarity of every chunk to `key`, in insertion order.
    ///
    /// A key of the other family scores every chunk zero.
    pub fn scores(&self, key: &QueryKey) -> Vec<f32> {
        match (&self.keys, key) {
            (IndexKeys::Lexical(index), QueryKey::Lexical(terms)) => index.scores(terms),
            (IndexKeys::Dense { vectors, .. }, QueryKey::Dense(query)) => vectors
                .iter()
                .map(|v| cosine_similarity(query, v))
                .collect(),
            _ => {
                debug!("Query key family does not match index representation");
                vec![0.0; self.chunks.len()]
            }
        }
    }
}

/// Builds a [`CorpusIndex`] from configuration.
pub struct IndexBuilder {
    config: CorpusConfig,
    embedder: Option<Arc<dyn Embedder>>,
    cache: Option<SharedEmbeddingCache>,
}

impl IndexBuilder {
    pub fn new(config: &CorpusConfig) -> Self {
        Self {
            config: config.clone(),
            embedder: None,
            cache: None,
        }
    }

    /// Use this embedder instead of the configured one
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Use this cache instead of opening `cache_path`
    pub fn with_cache(mut self, cache: SharedEmbeddingCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Load, chunk and key the configured corpus.
    ///
    /// Any failure here is run-fatal.
    #[instrument(skip_all, fields(dir = %self.config.dir.display()))]
    pub async fn build(self) -> Result<CorpusIndex> {
        let loaded = load_papers(&self.config.dir, &self.config.extensions)?;
        self.build_from(loaded).await
    }

    pub async fn build_from(self, loaded: LoadedPapers) -> Result<CorpusIndex> {
        let start = Instant::now();
        let LoadedPapers { papers, skipped } = loaded;

        let chunks = chunk_papers(&Chunker::from_config(&self.config), &papers);
        let stats = CorpusStats {
            papers: papers.len(),
            algorithm_chunks: chunks.iter().filter(|c| !c.passages.algorithms.is_empty()).count(),
            formula_chunks: chunks.iter().filter(|c| !c.passages.formulas.is_empty()).count(),
            skipped,
            ..CorpusStats::default()
        };

        let mut index = match self.config.representation {
            Representation::Lexical => CorpusIndex::lexical(chunks, stats),
            Representation::Embedding => self.dense(chunks, stats).await?,
        };
        index.stats.build_ms = start.elapsed().as_millis() as u64;

        if index.is_empty() {
            info!("Paper corpus is empty; prompts will be ungrounded");
        } else {
            info!(
                index = %index.id,
                papers = index.stats.papers,
                chunks = index.stats.chunks,
                representation = %index.stats.representation,
                elapsed_ms = index.stats.build_ms,
                "Paper index built"
            );
        }
        Ok(index)
    }

    async fn dense(self, chunks: Vec<PaperChunk>, mut stats: CorpusStats) -> Result<CorpusIndex> {
        let build_err = |e: PaperdocError| PaperdocError::IndexBuild(e.to_string());

        let embedder = match self.embedder {
            Some(embedder) => embedder,
            None => create_embedder(&self.config.embedding).map_err(build_err)?,
        };
        let cache = match (self.cache, &self.config.cache_path) {
            (Some(cache), _) => Some(cache),
            (None, Some(path)) if embedder.is_remote() => {
                Some(Arc::new(EmbeddingCache::open(path).map_err(build_err)?))
            }
            _ => None,
        };

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.config.embedding.batch_size.max(1)) {
            let hashes: Vec<&str> = batch.iter().map(|c| c.sha256.as_str()).collect();
            let hits = match &cache {
                Some(cache) => cache
                    .get_many(embedder.model(), &hashes)
                    .map_err(build_err)?,
                None => Default::default(),
            };

            let misses: Vec<&PaperChunk> = batch
                .iter()
                .filter(|c| !hits.contains_key(&c.sha256))
                .collect();
            let fresh = if misses.is_empty() {
                Vec::new()
            } else {
                let texts: Vec<String> = misses.iter().map(|c| c.text.clone()).collect();
                let fresh = embedder.embed(&texts).await.map_err(build_err)?;
                if fresh.len() != texts.len() {
                    return Err(PaperdocError::IndexBuild(format!(
                        "embedder returned {} vectors for {} chunks",
                        fresh.len(),
                        texts.len()
                    )));
                }
                if let Some(cache) = &cache {
                    let entries: Vec<(&str, &[f32])> = misses
                        .iter()
                        .zip(&fresh)
                        .map(|(c, v)| (c.sha256.as_str(), v.as_slice()))
                        .collect();
                    cache.put_many(embedder.model(), &entries).map_err(build_err)?;
                }
                fresh
            };

            stats.cached += batch.len() - misses.len();
            stats.embedded += fresh.len();

            let mut fresh = fresh.into_iter();
            for chunk in batch {
                let vector = match hits.get(&chunk.sha256) {
                    Some(v) => v.clone(),
                    None => fresh.next().unwrap_or_default(),
                };
                vectors.push(vector);
            }
            debug!(done = vectors.len(), total = chunks.len(), "Embedded chunk batch");
        }

        let dims = vectors.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = vectors.iter().position(|v| v.len() != dims) {
            return Err(PaperdocError::IndexBuild(format!(
                "chunk {} has {} dimensions, expected {}",
                chunks[bad].id,
                vectors[bad].len(),
                dims
            )));
        }

        stats.representation = Representation::Embedding.to_string();
        stats.dimensions = dims;
        stats.chunks = chunks.len();
        Ok(CorpusIndex {
            id: IndexId::new(),
            chunks,
            keys: IndexKeys::Dense { embedder, vectors },
            stats,
        })
    }
}

fn chunk_papers(chunker: &Chunker, papers: &[Paper]) -> Vec<PaperChunk> {
    papers
        .iter()
        .flat_map(|paper| {
            let chunks = chunker.chunk(&paper.id, &paper.text);
            debug!(paper = %paper.id, chunks = chunks.len(), "Chunked paper");
            chunks
        })
        .collect()
}
