//! paperdoc - Paper-Grounded Documentation Generator
//!
//! Generates per-function markdown documentation for a C++ codebase,
//! grounding each prompt in excerpts from a corpus of academic papers.
//!
//! ## Pipeline
//!
//! For every function-level unit extracted from the source tree:
//!
//! 1. **Retrieve** the most relevant paper chunks from a read-only index
//! 2. **Compose** a bounded prompt (unit code is never truncated)
//! 3. **Generate** through a provider gateway with retry and backoff
//! 4. **Materialize** one markdown artifact with a provenance footer
//!
//! Units run concurrently under a fixed bound, and every unit ends in
//! exactly one entry of the [`RunReport`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use paperdoc::{Config, IndexBuilder, Orchestrator, UnitExtractor};
//! use paperdoc::ai::{ProviderConfig, create_provider};
//!
//! let config = Config::default();
//! let units = UnitExtractor::new(&config.sources).units()?;
//! let index = Arc::new(IndexBuilder::new(&config.corpus).build().await?);
//! let provider = create_provider(&ProviderConfig::from_config(&config.llm, &config.prompt.system_prompt))?;
//! let report = Orchestrator::from_config(&config, index, provider)?.run(units).await;
//! ```
//!
//! ## Modules
//!
//! - [`analyzer`]: source scanning and structural C++ unit extraction
//! - [`corpus`]: paper loading, chunking, and the relevance index
//! - [`retrieval`]: top-K chunk ranking per unit
//! - [`ai`]: prompt composition, provider backends, and the gateway
//! - [`output`]: artifact materialization
//! - [`pipeline`]: per-unit state machine, orchestration, and run report
//! - [`storage`]: sqlite embedding cache
//! - [`config`]: layered configuration

pub mod ai;
pub mod analyzer;
pub mod cli;
pub mod config;
pub mod constants;
pub mod corpus;
pub mod output;
pub mod pipeline;
pub mod retrieval;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

pub use config::{Config, ConfigLoader};
pub use types::{
    ChunkId, ErrorCategory, FailureKind, IndexId, LlmError, PaperdocError, Result, ResultExt,
    SourceUnit, UnitId,
};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use analyzer::{UnitExtractor, UnitStream};
pub use corpus::{CorpusIndex, IndexBuilder, PaperChunk};
pub use output::{Materializer, WriteOutcome};
pub use pipeline::{CancellationToken, Orchestrator, RunOutcome, RunReport, UnitStatus};
pub use retrieval::{RetrievalResult, ScoredChunk};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{Composer, Gateway, GenerationResult, LlmProvider, Prompt, SharedProvider};
