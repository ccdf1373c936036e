//! Paper Corpus
//!
//! Loads plain-text papers, chunks them, and builds the run's read-only
//! relevance index (lexical BM25 or dense embeddings).

pub mod chunker;
pub mod embedding;
pub mod index;
pub mod lexical;

pub use chunker::{Chunker, find_passages};
pub use embedding::{
    Embedder, HashingEmbedder, OllamaEmbedder, OpenAiEmbedder, cosine_similarity,
    create_embedder,
};
pub use index::{CorpusIndex, CorpusStats, IndexBuilder, QueryKey};
pub use lexical::{LexicalIndex, tokenize};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analyzer::{FileScanner, SkippedFile};
use crate::types::{ChunkId, PaperdocError, Result};

/// One retrievable slice of a paper. Immutable once indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperChunk {
    pub id: ChunkId,
    pub text: String,
    /// Section heading in force where the chunk starts
    pub section: Option<String>,
    /// 1-based page (form-feed separated)
    pub page: usize,
    /// sha256 of `text`, hex
    pub sha256: String,
    /// Algorithm blocks and numbered equations inside the chunk
    #[serde(default)]
    pub passages: Passages,
}

/// Algorithm and formula passages detected in chunk text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passages {
    /// Block labels as written: `Algorithm 2`, `Procedure 1`
    pub algorithms: Vec<String>,
    /// Lines carrying an equation number such as `(3)` or `(Eq. 4)`
    pub formulas: Vec<String>,
}

impl Passages {
    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty() && self.formulas.is_empty()
    }
}

/// A paper's text, already converted to plain text upstream
#[derive(Debug, Clone)]
pub struct Paper {
    /// Corpus-relative path, extension included (`x.txt` and `x.md` differ)
    pub id: String,
    pub path: PathBuf,
    pub text: String,
}

/// Papers read from a corpus directory plus the files that could not be read
#[derive(Debug, Default)]
pub struct LoadedPapers {
    pub papers: Vec<Paper>,
    pub skipped: Vec<SkippedFile>,
}

/// Read every paper under `dir` with one of `extensions`.
///
/// A missing directory is an empty corpus, not an error.
pub fn load_papers(dir: &Path, extensions: &[String]) -> Result<LoadedPapers> {
    if !dir.exists() {
        warn!(dir = %dir.display(), "Paper directory not found; generating without grounding");
        return Ok(LoadedPapers::default());
    }

    let scan = FileScanner::new(dir)
        .with_extensions(extensions)
        .with_max_file_size(u64::MAX)
        .scan()
        .map_err(|e| PaperdocError::IndexBuild(e.to_string()))?;

    let mut loaded = LoadedPapers {
        papers: Vec::with_capacity(scan.files.len()),
        skipped: scan.skipped,
    };

    for file in scan.files {
        match std::fs::read(&file.path) {
            Ok(bytes) => {
                let id = file.relative.clone();
                debug!(paper = %id, bytes = bytes.len(), "Loaded paper");
                loaded.papers.push(Paper {
                    id,
                    path: file.path,
                    text: String::from_utf8_lossy(&bytes).into_owned(),
                });
            }
            Err(e) => {
                warn!(path = %file.relative, error = %e, "Skipping unreadable paper");
                loaded.skipped.push(SkippedFile {
                    path: file.relative,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_dir_is_empty_corpus() {
        let temp = TempDir::new().unwrap();
        let loaded = load_papers(&temp.path().join("none"), &["txt".to_string()]).unwrap();
        assert!(loaded.papers.is_empty());
        assert!(loaded.skipped.is_empty());
    }

    #[test]
    fn test_paper_ids_are_relative_paths() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("graphs")).unwrap();
        fs::write(temp.path().join("graphs/dijkstra1959.txt"), "shortest paths").unwrap();
        fs::write(temp.path().join("knuth.md"), "sorting").unwrap();
        fs::write(temp.path().join("figure.png"), "binary").unwrap();

        let loaded = load_papers(temp.path(), &["txt".to_string(), "md".to_string()]).unwrap();
        let ids: Vec<_> = loaded.papers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["graphs/dijkstra1959.txt", "knuth.md"]);
    }
}
