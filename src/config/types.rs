//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Every section is `#[serde(default)]` so partial files and env overrides merge cleanly.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::{PaperdocError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// C++ source tree settings
    pub sources: SourcesConfig,

    /// Paper corpus and index settings
    pub corpus: CorpusConfig,

    /// Retrieval settings
    pub retrieval: RetrievalConfig,

    /// Prompt composition settings
    pub prompt: PromptConfig,

    /// LLM provider settings
    pub llm: LlmConfig,

    /// Artifact output settings
    pub output: OutputConfig,

    /// Worker pool settings
    pub pipeline: PipelineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            sources: SourcesConfig::default(),
            corpus: CorpusConfig::default(),
            retrieval: RetrievalConfig::default(),
            prompt: PromptConfig::default(),
            llm: LlmConfig::default(),
            output: OutputConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `PaperdocError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(PaperdocError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(PaperdocError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.llm.backoff_factor < 1.0 {
            return Err(PaperdocError::Config(format!(
                "LLM backoff_factor must be at least 1.0, got {}",
                self.llm.backoff_factor
            )));
        }

        if self.pipeline.concurrency == 0 {
            return Err(PaperdocError::Config(
                "Pipeline concurrency must be greater than 0".to_string(),
            ));
        }

        if self.corpus.chunk_size == 0 {
            return Err(PaperdocError::Config(
                "Corpus chunk_size must be greater than 0".to_string(),
            ));
        }

        if self.corpus.chunk_overlap >= self.corpus.chunk_size {
            return Err(PaperdocError::Config(format!(
                "Corpus chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.corpus.chunk_overlap, self.corpus.chunk_size
            )));
        }

        if self.corpus.embedding.timeout_secs == 0 {
            return Err(PaperdocError::Config(
                "Embedding timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.prompt.budget == 0 {
            return Err(PaperdocError::Config(
                "Prompt budget must be greater than 0".to_string(),
            ));
        }

        if self.sources.extensions.is_empty() {
            return Err(PaperdocError::Config(
                "Sources extensions must not be empty".to_string(),
            ));
        }

        if self.corpus.extensions.is_empty() {
            return Err(PaperdocError::Config(
                "Corpus extensions must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Sources Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Root of the C++ source tree
    pub root: PathBuf,

    /// File extensions to extract units from (without leading dot)
    pub extensions: Vec<String>,

    /// Glob patterns to exclude
    pub exclude: Vec<String>,

    /// Maximum file size in bytes
    pub max_file_size: usize,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            extensions: ["cpp", "cc", "cxx", "hpp", "hxx", "hh", "h"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude: vec![
                ".git/**".to_string(),
                "build/**".to_string(),
                "cmake-build-*/**".to_string(),
                "third_party/**".to_string(),
                "external/**".to_string(),
            ],
            max_file_size: 1_048_576, // 1MB
        }
    }
}

// =============================================================================
// Corpus Configuration
// =============================================================================

/// How paper text is split into chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    /// Fixed-size character windows with overlap
    #[default]
    Fixed,
    /// Paragraph-packed chunks up to the size limit
    Paragraph,
}

impl std::fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkingStrategy::Fixed => write!(f, "fixed"),
            ChunkingStrategy::Paragraph => write!(f, "paragraph"),
        }
    }
}

impl std::str::FromStr for ChunkingStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(ChunkingStrategy::Fixed),
            "paragraph" => Ok(ChunkingStrategy::Paragraph),
            _ => Err(format!(
                "Unknown chunking strategy: {}. Valid values: fixed, paragraph",
                s
            )),
        }
    }
}

/// Relevance key family used by the index and the retriever
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    /// Token-frequency (BM25) index
    #[default]
    Lexical,
    /// Dense vectors with cosine similarity
    Embedding,
}

impl std::fmt::Display for Representation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Representation::Lexical => write!(f, "lexical"),
            Representation::Embedding => write!(f, "embedding"),
        }
    }
}

impl std::str::FromStr for Representation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lexical" => Ok(Representation::Lexical),
            "embedding" | "dense" => Ok(Representation::Embedding),
            _ => Err(format!(
                "Unknown representation: {}. Valid values: lexical, embedding",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Directory of plain-text papers
    pub dir: PathBuf,

    /// Paper file extensions (without leading dot)
    pub extensions: Vec<String>,

    /// Chunking strategy
    pub chunking: ChunkingStrategy,

    /// Target chunk size in characters
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,

    /// Index representation
    pub representation: Representation,

    /// SQLite embedding cache; disabled when unset
    pub cache_path: Option<PathBuf>,

    /// Embedding backend (used when representation = embedding)
    pub embedding: EmbeddingConfig,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("papers"),
            extensions: vec!["txt".to_string(), "md".to_string()],
            chunking: ChunkingStrategy::Fixed,
            chunk_size: 1000,
            chunk_overlap: 200,
            representation: Representation::Lexical,
            cache_path: None,
            embedding: EmbeddingConfig::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding provider: hashing, ollama, openai
    pub provider: String,

    /// Embedding model name
    pub model: String,

    /// API base URL override
    pub api_base: Option<String>,

    /// API key (never serialized)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Vector dimensions (hashing embedder)
    pub dims: usize,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Texts per embedding request
    pub batch_size: usize,
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("dims", &self.dims)
            .field("timeout_secs", &self.timeout_secs)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashing".to_string(),
            model: "nomic-embed-text".to_string(),
            api_base: None,
            api_key: None,
            dims: 384,
            timeout_secs: 60,
            batch_size: 32,
        }
    }
}

// =============================================================================
// Retrieval Configuration
// =============================================================================

/// What text is used as the retrieval query for a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Signature, name, hints, and body text
    #[default]
    Code,
    /// A short LLM-written description of the unit
    Described,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per unit
    pub top_k: usize,

    /// Hits scoring below this are discarded
    pub min_score: f32,

    /// Query construction mode
    pub query_mode: QueryMode,

    /// Ask the model whether retrieved context is relevant before grounding
    pub relevance_gate: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_score: 0.0,
            query_mode: QueryMode::Code,
            relevance_gate: false,
        }
    }
}

// =============================================================================
// Prompt Configuration
// =============================================================================

/// Unit of measure for the prompt budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BudgetUnit {
    #[default]
    Chars,
    Tokens,
}

impl BudgetUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetUnit::Chars => "chars",
            BudgetUnit::Tokens => "tokens",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Maximum prompt size
    pub budget: usize,

    /// How `budget` is measured
    pub budget_unit: BudgetUnit,

    /// TOML file overriding the built-in templates
    pub template_path: Option<PathBuf>,

    /// System prompt sent to chat-style backends
    pub system_prompt: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            budget: 12_000,
            budget_unit: BudgetUnit::Chars,
            template_path: None,
            system_prompt: crate::constants::prompt::DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: ollama, openai, gemini
    pub provider: String,

    /// Model name
    pub model: String,

    /// API base URL override
    pub api_base: Option<String>,

    /// API key (never serialized)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Per-attempt timeout in seconds
    pub timeout_secs: u64,

    /// Sampling temperature
    pub temperature: f32,

    /// Upper bound on generated tokens
    pub max_output_tokens: u32,

    /// Retries after the initial attempt
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    pub base_delay_ms: u64,

    /// Backoff ceiling in seconds
    pub max_delay_secs: u64,

    /// Exponential backoff multiplier
    pub backoff_factor: f64,

    /// Add random jitter to backoff delays
    pub jitter: bool,

    /// Minimum wait after a rate-limit signal without Retry-After
    pub rate_limit_wait_secs: u64,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("max_retries", &self.max_retries)
            .field("base_delay_ms", &self.base_delay_ms)
            .field("max_delay_secs", &self.max_delay_secs)
            .field("backoff_factor", &self.backoff_factor)
            .field("jitter", &self.jitter)
            .field("rate_limit_wait_secs", &self.rate_limit_wait_secs)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.1".to_string(),
            api_base: None,
            api_key: None,
            timeout_secs: 120,
            temperature: 0.7,
            max_output_tokens: 2000,
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_secs: 60,
            backoff_factor: 2.0,
            jitter: true,
            rate_limit_wait_secs: 10,
        }
    }
}

// =============================================================================
// Output Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Artifact root directory
    pub dir: PathBuf,

    /// Write a placeholder artifact for failed units
    pub write_failure_placeholder: bool,

    /// Run report path; defaults to `<dir>/run-report.json`
    pub report_file: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("docs"),
            write_failure_placeholder: false,
            report_file: None,
        }
    }
}

impl OutputConfig {
    pub fn report_path(&self) -> PathBuf {
        self.report_file
            .clone()
            .unwrap_or_else(|| self.dir.join("run-report.json"))
    }
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum unit pipelines (and outbound LLM calls) in flight
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.llm.provider, "ollama");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.pipeline.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_overlap_not_smaller_than_size() {
        let mut config = Config::default();
        config.corpus.chunk_size = 100;
        config.corpus.chunk_overlap = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_temperature() {
        let mut config = Config::default();
        config.llm.temperature = 2.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_redacted_and_not_serialized() {
        let mut config = LlmConfig::default();
        config.api_key = Some("sk-secret".to_string());

        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!(
            "paragraph".parse::<ChunkingStrategy>().unwrap(),
            ChunkingStrategy::Paragraph
        );
        assert_eq!(
            "embedding".parse::<Representation>().unwrap(),
            Representation::Embedding
        );
        assert!("semantic".parse::<ChunkingStrategy>().is_err());
        assert_eq!(Representation::Lexical.to_string(), "lexical");
    }

    #[test]
    fn test_report_path_default() {
        let output = OutputConfig::default();
        assert_eq!(output.report_path(), PathBuf::from("docs/run-report.json"));
    }
}
