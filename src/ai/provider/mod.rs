//! LLM Provider Abstraction
//!
//! Defines the `LlmProvider` capability trait: plain-text completion plus
//! a health check. Backends are interchangeable; nothing outside this
//! module knows which one is in use.
//!
//! ## Backends
//!
//! - `ollama`: local inference server (`/api/chat`)
//! - `openai`: OpenAI-compatible chat completions
//! - `gemini`: Google `generateContent`

mod gemini;
#[cfg(test)]
pub(crate) mod mock;
mod ollama;
mod openai;

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

// Re-export error types from centralized location
pub use crate::types::{ErrorCategory, ErrorClassifier, LlmError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::LlmConfig;
use crate::constants::gateway::MAX_RETRY_AFTER_SECS;
use crate::constants::network::CONNECTION_TIMEOUT_SECS;
use crate::types::{PaperdocError, Result};

// =============================================================================
// Completion Types
// =============================================================================

/// Per-call generation options
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Deadline for this single attempt
    pub timeout: Duration,
}

impl CompletionOptions {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Same options with a different output cap
    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }
}

/// Text produced by one successful provider call
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
    /// Model that served the request
    pub model: String,
}

/// Token usage reported by the provider (zero when unknown)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens (prompt)
    pub input_tokens: u32,
    /// Output tokens (response)
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens used (input + output)
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Shared LLM provider type for concurrent access across unit pipelines.
pub type SharedProvider = Arc<dyn LlmProvider>;

// =============================================================================
// Provider Configuration
// =============================================================================

/// Configuration for LLM providers
///
/// API keys are never serialized and are redacted in debug output. Each
/// provider converts the key to a `SecretString` internally.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type: "ollama", "openai", "gemini"
    pub provider: String,
    /// Model name (provider-specific)
    pub model: String,
    /// API base URL (for custom endpoints)
    #[serde(default)]
    pub api_base: Option<String>,
    /// Never serialized to output
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// System instruction sent with every completion
    pub system_prompt: String,
    /// Timeout for requests without per-call options (health checks)
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    pub fn from_config(llm: &LlmConfig, system_prompt: &str) -> Self {
        Self {
            provider: llm.provider.clone(),
            model: llm.model.clone(),
            api_base: llm.api_base.clone(),
            api_key: llm.api_key.clone(),
            system_prompt: system_prompt.to_string(),
            timeout_secs: llm.timeout_secs,
        }
    }
}

// =============================================================================
// LLM Provider Trait
// =============================================================================

/// Text completion capability shared by every backend
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete `prompt`.
    ///
    /// Failures are `PaperdocError::Llm` with a category the gateway's
    /// retry policy understands.
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<Completion>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model name currently in use
    fn model(&self) -> &str;

    /// Check if the provider is reachable and the model is usable
    async fn health_check(&self) -> Result<bool>;
}

/// Create a shared provider from configuration
pub fn create_provider(config: &ProviderConfig) -> Result<SharedProvider> {
    match config.provider.to_lowercase().as_str() {
        "ollama" => Ok(Arc::new(OllamaProvider::new(config.clone())?)),
        "openai" => Ok(Arc::new(OpenAiProvider::new(config.clone())?)),
        "gemini" => Ok(Arc::new(GeminiProvider::new(config.clone())?)),
        _ => Err(PaperdocError::Config(format!(
            "Unknown provider: {}. Supported: ollama, openai, gemini",
            config.provider
        ))),
    }
}

// =============================================================================
// Shared HTTP helpers
// =============================================================================

/// Validate endpoint URL for security (SSRF prevention)
///
/// Only allows http/https schemes and warns for plain-http remote hosts.
/// Returns the URL without a trailing slash.
pub(crate) fn validate_endpoint(endpoint: &str, label: &str) -> Result<String> {
    let url = url::Url::parse(endpoint).map_err(|e| {
        PaperdocError::Config(format!("Invalid {} endpoint URL '{}': {}", label, endpoint, e))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(PaperdocError::Config(format!(
            "{} endpoint must use http or https scheme, got: {}",
            label,
            url.scheme()
        )));
    }

    if url.scheme() == "http"
        && let Some(host) = url.host_str()
        && !matches!(host, "localhost" | "127.0.0.1" | "::1" | "[::1]")
    {
        warn!(
            host = %host,
            "{} endpoint uses plain http on a non-local host. Ensure this is intentional.",
            label
        );
    }

    let mut result = url.to_string();
    if result.ends_with('/') {
        result.pop();
    }
    Ok(result)
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECS))
        .build()
        .map_err(|e| PaperdocError::LlmApi(format!("Failed to create HTTP client: {}", e)))
}

/// Classify a non-success HTTP response, honoring a `Retry-After` header
pub(crate) async fn http_error(response: reqwest::Response, provider: &str) -> PaperdocError {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)));
    let body = response.text().await.unwrap_or_default();

    let mut err = ErrorClassifier::classify_http_status(
        status,
        &format!("HTTP {}: {}", status, truncate(&body, 500)),
        provider,
    );
    if let Some(wait) = retry_after {
        err = err.retry_after(wait);
    }
    err.into()
}

/// Classify a transport failure (connect, timeout, decode)
pub(crate) fn transport_error(err: reqwest::Error, provider: &str) -> PaperdocError {
    ErrorClassifier::classify_reqwest(&err, provider).into()
}

/// Response arrived but carried nothing usable
pub(crate) fn empty_response(provider: &str, detail: &str) -> PaperdocError {
    LlmError::with_provider(ErrorCategory::Unknown, detail, provider).into()
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_endpoint_strips_trailing_slash() {
        assert_eq!(
            validate_endpoint("http://localhost:11434/", "Ollama").unwrap(),
            "http://localhost:11434"
        );
    }

    #[test]
    fn test_validate_endpoint_rejects_other_schemes() {
        let err = validate_endpoint("file:///etc/passwd", "Ollama").unwrap_err();
        assert!(matches!(err, PaperdocError::Config(_)));
        assert!(validate_endpoint("not a url", "Ollama").is_err());
    }

    #[test]
    fn test_create_provider_rejects_unknown() {
        let config = ProviderConfig {
            provider: "llamafile".to_string(),
            ..ProviderConfig::from_config(&LlmConfig::default(), "sys")
        };
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn test_create_ollama_from_defaults() {
        let config = ProviderConfig::from_config(&LlmConfig::default(), "sys");
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model(), LlmConfig::default().model);
    }

    #[test]
    fn test_provider_config_debug_redacts_key() {
        let mut config = ProviderConfig::from_config(&LlmConfig::default(), "sys");
        config.api_key = Some("sk-secret".to_string());
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_completion_options_from_config() {
        let options = CompletionOptions::from_config(&LlmConfig::default());
        assert_eq!(options.timeout, Duration::from_secs(120));
        assert_eq!(options.with_max_output_tokens(10).max_output_tokens, 10);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 5), "hi");
    }
}
