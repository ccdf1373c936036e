//! Unified Error Type System
//!
//! Centralized error types for the entire application.
//! Provides error classification for the gateway's retry decisions and the
//! per-unit failure taxonomy recorded in the run report.
//!
//! ## Error Categories
//!
//! - **RateLimit**: Provider asked us to slow down (wait, then retry)
//! - **Timeout**: Attempt exceeded its deadline (retry with backoff)
//! - **Transient**: 5xx-class provider failure (retry with backoff)
//! - **Network**: Connectivity issues (retry with backoff)
//! - **Auth / BadRequest / ContentPolicy**: Never retried
//!
//! ## Design Principles
//!
//! - Single application error type (`PaperdocError`)
//! - Category-based routing for retry decisions
//! - Per-unit failures are data (`FailureKind`), never run-aborting errors

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Provider error categories used by the gateway's retry state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Rate limited - wait at least the advertised delay, then retry
    RateLimit,
    /// Attempt exceeded its per-attempt deadline
    Timeout,
    /// 5xx-class server failure
    Transient,
    /// Connection refused, DNS failure, reset
    Network,
    /// Authentication or authorization failure
    Auth,
    /// Malformed request, unknown model, context too long
    BadRequest,
    /// Provider refused the content
    ContentPolicy,
    /// Unclassified failure
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Network => write!(f, "NETWORK"),
            Self::Auth => write!(f, "AUTH"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::ContentPolicy => write!(f, "CONTENT_POLICY"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Transient categories are retried by the gateway
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Timeout | Self::Transient | Self::Network
        )
    }

    /// Failure kind recorded when this category ends a unit
    pub fn failure_kind(&self) -> FailureKind {
        if self.is_transient() {
            FailureKind::ProviderTransient
        } else {
            FailureKind::ProviderTerminal
        }
    }
}

// =============================================================================
// LLM Error
// =============================================================================

/// Structured provider error with category, context, and retry hints
#[derive(Debug, Clone)]
pub struct LlmError {
    /// Error category for routing decisions
    pub category: ErrorCategory,
    /// Detailed error message
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
    /// Provider-supplied minimum wait before the next attempt
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            provider: None,
            retry_after: None,
        }
    }

    pub fn with_provider(
        category: ErrorCategory,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            provider: Some(provider.into()),
            retry_after: None,
        }
    }

    /// Attach provider context
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Attach a provider-supplied retry delay
    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn is_transient(&self) -> bool {
        self.category.is_transient()
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps provider responses and errors onto `ErrorCategory`
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a free-text error message from any provider
    pub fn classify(message: &str, provider: &str) -> LlmError {
        let lower = message.to_lowercase();

        if lower.contains("rate limit")
            || lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("quota exceeded")
            || lower.contains("resource_exhausted")
        {
            let mut err = LlmError::with_provider(ErrorCategory::RateLimit, message, provider);
            if let Some(wait) = parse_retry_after(&lower) {
                err = err.retry_after(wait);
            }
            return err;
        }

        if lower.contains("timed out") || lower.contains("timeout") || lower.contains("deadline")
        {
            return LlmError::with_provider(ErrorCategory::Timeout, message, provider);
        }

        if lower.contains("unauthorized")
            || lower.contains("401")
            || lower.contains("403")
            || lower.contains("api key")
            || lower.contains("invalid key")
            || lower.contains("permission denied")
            || lower.contains("authentication")
        {
            return LlmError::with_provider(ErrorCategory::Auth, message, provider);
        }

        if lower.contains("content policy")
            || lower.contains("content_filter")
            || lower.contains("safety")
            || lower.contains("blocked")
        {
            return LlmError::with_provider(ErrorCategory::ContentPolicy, message, provider);
        }

        if lower.contains("connection")
            || lower.contains("dns")
            || lower.contains("unreachable")
            || lower.contains("network")
            || lower.contains("reset by peer")
        {
            return LlmError::with_provider(ErrorCategory::Network, message, provider);
        }

        if lower.contains("503")
            || lower.contains("502")
            || lower.contains("500")
            || lower.contains("504")
            || lower.contains("service unavailable")
            || lower.contains("server error")
            || lower.contains("overloaded")
            || lower.contains("temporar")
        {
            return LlmError::with_provider(ErrorCategory::Transient, message, provider);
        }

        if lower.contains("400")
            || lower.contains("bad request")
            || lower.contains("invalid")
            || lower.contains("malformed")
            || lower.contains("context length")
        {
            return LlmError::with_provider(ErrorCategory::BadRequest, message, provider);
        }

        LlmError::with_provider(ErrorCategory::Unknown, message, provider)
    }

    /// Classify an HTTP status code (more accurate than string matching)
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> LlmError {
        match status {
            429 => LlmError::with_provider(ErrorCategory::RateLimit, message, provider),
            401 | 403 => LlmError::with_provider(ErrorCategory::Auth, message, provider),
            408 => LlmError::with_provider(ErrorCategory::Timeout, message, provider),
            400 | 404 | 413 | 422 => {
                // Some hosts report policy refusals as 400 with a descriptive body
                let lower = message.to_lowercase();
                if lower.contains("safety") || lower.contains("content policy") {
                    LlmError::with_provider(ErrorCategory::ContentPolicy, message, provider)
                } else {
                    LlmError::with_provider(ErrorCategory::BadRequest, message, provider)
                }
            }
            500..=599 => LlmError::with_provider(ErrorCategory::Transient, message, provider),
            _ => LlmError::with_provider(ErrorCategory::Unknown, message, provider),
        }
    }

    /// Classify a `PaperdocError` with type-based routing
    pub fn classify_error(err: &PaperdocError, provider: &str) -> LlmError {
        match err {
            PaperdocError::Llm(llm_err) => {
                let mut classified = llm_err.clone();
                if classified.provider.is_none() {
                    classified.provider = Some(provider.to_string());
                }
                classified
            }
            PaperdocError::Timeout { .. } => {
                LlmError::with_provider(ErrorCategory::Timeout, err.to_string(), provider)
            }
            PaperdocError::Http(http) => Self::classify_reqwest(http, provider),
            PaperdocError::Config(_) => {
                LlmError::with_provider(ErrorCategory::BadRequest, err.to_string(), provider)
            }
            PaperdocError::Json(_) => {
                LlmError::with_provider(ErrorCategory::Unknown, err.to_string(), provider)
            }
            PaperdocError::LlmApi(msg) => Self::classify(msg, provider),
            _ => LlmError::with_provider(ErrorCategory::Unknown, err.to_string(), provider),
        }
    }

    /// Classify a transport-level reqwest failure
    pub fn classify_reqwest(err: &reqwest::Error, provider: &str) -> LlmError {
        if err.is_timeout() {
            LlmError::with_provider(ErrorCategory::Timeout, err.to_string(), provider)
        } else if err.is_connect() || err.is_request() {
            LlmError::with_provider(ErrorCategory::Network, err.to_string(), provider)
        } else if let Some(status) = err.status() {
            Self::classify_http_status(status.as_u16(), &err.to_string(), provider)
        } else if err.is_decode() {
            LlmError::with_provider(ErrorCategory::Unknown, err.to_string(), provider)
        } else {
            Self::classify(&err.to_string(), provider)
        }
    }
}

/// Extract a retry delay from messages like "retry after 20 seconds"
fn parse_retry_after(lower: &str) -> Option<Duration> {
    for pattern in ["retry after ", "retry-after: ", "wait ", "retry in "] {
        if let Some(idx) = lower.find(pattern) {
            let rest = &lower[idx + pattern.len()..];
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(secs) = digits.parse::<u64>() {
                return Some(Duration::from_secs(secs.min(300)));
            }
        }
    }
    None
}

// =============================================================================
// Per-Unit Failure Kinds
// =============================================================================

/// Terminal failure kinds recorded per unit in the run report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FailureKind {
    /// Source file was malformed; contributes no units
    ExtractionSkipped,
    /// Unit body alone exceeds the prompt budget
    UnitTooLarge,
    /// Provider kept failing transiently until retries ran out
    ProviderTransient,
    /// Provider rejected the request; not retried
    ProviderTerminal,
    /// Artifact could not be written
    MaterializationFailure,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ExtractionSkipped => "ExtractionSkipped",
            Self::UnitTooLarge => "UnitTooLarge",
            Self::ProviderTransient => "ProviderTransient",
            Self::ProviderTerminal => "ProviderTerminal",
            Self::MaterializationFailure => "MaterializationFailure",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum PaperdocError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // -------------------------------------------------------------------------
    // LLM Errors
    // -------------------------------------------------------------------------
    /// Structured LLM error with category and retry hints
    #[error("LLM error: {0}")]
    Llm(LlmError),

    /// Simple LLM API error (use Llm variant for structured errors)
    #[error("LLM API error: {0}")]
    LlmApi(String),

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    // -------------------------------------------------------------------------
    // Pipeline Errors
    // -------------------------------------------------------------------------
    /// Source tree could not be enumerated at all (run-fatal)
    #[error("Cannot enumerate source tree {path}: {message}")]
    SourceTree { path: String, message: String },

    /// Paper index could not be built (run-fatal)
    #[error("Index build failed: {0}")]
    IndexBuild(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Unit {unit} too large: {size} {unit_of_measure} exceeds budget of {budget}")]
    UnitTooLarge {
        unit: String,
        size: usize,
        budget: usize,
        unit_of_measure: &'static str,
    },

    #[error("Failed to write artifact {path}: {message}")]
    Materialization { path: String, message: String },

    #[error("Invalid state transition for {unit}: {from} -> {to}")]
    InvalidTransition {
        unit: String,
        from: String,
        to: String,
    },

    #[error("Template error: {0}")]
    Template(String),

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<LlmError> for PaperdocError {
    fn from(err: LlmError) -> Self {
        PaperdocError::Llm(err)
    }
}

pub type Result<T> = std::result::Result<T, PaperdocError>;

impl PaperdocError {
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Whether this error aborts the whole run rather than a single unit
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Self::SourceTree { .. } | Self::IndexBuild(_) | Self::Config(_)
        )
    }

    /// Per-unit failure kind for errors raised inside a unit pipeline
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::UnitTooLarge { .. } => FailureKind::UnitTooLarge,
            Self::Materialization { .. } | Self::Io(_) => FailureKind::MaterializationFailure,
            Self::Llm(e) => e.category.failure_kind(),
            Self::Timeout { .. } => FailureKind::ProviderTransient,
            _ => FailureKind::ProviderTerminal,
        }
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Add context using a closure (lazy evaluation)
    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| PaperdocError::Storage(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| PaperdocError::Storage(format!("{}: {}", f().into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================
