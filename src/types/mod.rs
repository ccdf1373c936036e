pub mod error;
pub mod unit;

pub use error::{
    ErrorCategory, ErrorClassifier, FailureKind, LlmError, PaperdocError, Result, ResultExt,
};
pub use unit::{Parameter, SourceUnit, UnitId};

// =============================================================================
// Domain Newtypes
// =============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one Indexer instance (one per run)
///
/// Prompts carry it so chunk references can be checked against the index they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexId(uuid::Uuid);

impl IndexId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for IndexId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a paper chunk: (paper identifier, chunk index)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub paper_id: String,
    pub index: usize,
}

impl ChunkId {
    pub fn new(paper_id: impl Into<String>, index: usize) -> Self {
        Self {
            paper_id: paper_id.into(),
            index,
        }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.paper_id, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_ids_are_unique() {
        assert_ne!(IndexId::new(), IndexId::new());
    }

    #[test]
    fn test_chunk_id_display_and_order() {
        let a = ChunkId::new("smith2020", 2);
        let b = ChunkId::new("smith2020", 10);
        assert_eq!(a.to_string(), "smith2020#2");
        assert!(a < b);
    }
}
