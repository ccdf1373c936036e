//! Google Gemini Provider
//!
//! Completion via the `models/{model}:generateContent` endpoint.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    Completion, CompletionOptions, LlmProvider, ProviderConfig, TokenUsage, empty_response,
    http_client, http_error, transport_error, validate_endpoint,
};
use crate::constants::network::{GEMINI_DEFAULT_ENDPOINT, HEALTH_CHECK_TIMEOUT_SECS};
use crate::types::{ErrorCategory, LlmError, PaperdocError, Result};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini API Provider with secure API key handling
pub struct GeminiProvider {
    api_key: SecretString,
    api_base: String,
    model: String,
    system_prompt: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key_str = config
            .api_key
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .ok_or_else(|| {
                PaperdocError::Config(
                    "Gemini API key not found. Set GEMINI_API_KEY env var or llm.api_key"
                        .to_string(),
                )
            })?;

        let api_base = config
            .api_base
            .unwrap_or_else(|| GEMINI_DEFAULT_ENDPOINT.to_string());

        Ok(Self {
            api_key: SecretString::from(api_key_str),
            api_base: validate_endpoint(&api_base, "Gemini")?,
            model: config.model,
            system_prompt: config.system_prompt,
            client: http_client()?,
        })
    }

    fn build_request(&self, prompt: &str, options: &CompletionOptions) -> GenerateRequest {
        GenerateRequest {
            system_instruction: (!self.system_prompt.is_empty()).then(|| Content {
                role: None,
                parts: vec![Part {
                    text: self.system_prompt.clone(),
                }],
            }),
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_output_tokens,
            },
        }
    }

    fn model_path(&self) -> String {
        let model = self.model.trim_start_matches("models/");
        format!("{}/models/{}", self.api_base, model)
    }
}

/// Collapse a parsed response into text, surfacing safety blocks
fn response_text(body: GenerateResponse) -> Result<(String, TokenUsage)> {
    if let Some(reason) = body.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(LlmError::with_provider(
            ErrorCategory::ContentPolicy,
            format!("Prompt blocked: {}", reason),
            "gemini",
        )
        .into());
    }

    let usage = body
        .usage_metadata
        .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count))
        .unwrap_or_default();

    let candidate = body
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| empty_response("gemini", "No candidates in Gemini response"))?;

    if matches!(
        candidate.finish_reason.as_deref(),
        Some("SAFETY") | Some("PROHIBITED_CONTENT") | Some("BLOCKLIST")
    ) {
        return Err(LlmError::with_provider(
            ErrorCategory::ContentPolicy,
            "Candidate blocked by safety filters",
            "gemini",
        )
        .into());
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(empty_response("gemini", "No text in Gemini response"));
    }
    Ok((text, usage))
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<Completion> {
        let request = self.build_request(prompt, options);
        let url = format!("{}:generateContent", self.model_path());

        debug!(model = %self.model, prompt_chars = prompt.len(), "Sending request to Gemini API");

        let response = self
            .client
            .post(&url)
            .timeout(options.timeout)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, "gemini"))?;

        if !response.status().is_success() {
            return Err(http_error(response, "gemini").await);
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| transport_error(e, "gemini"))?;
        let (text, usage) = response_text(body)?;

        Ok(Completion {
            text,
            usage,
            model: self.model.clone(),
        })
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.model_path())
            .timeout(Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                info!(model = %self.model, "Gemini API is available");
                Ok(true)
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "Gemini API check failed");
                Ok(false)
            }
            Err(e) => {
                warn!("Gemini API check failed: {}", e);
                Ok(false)
            }
        }
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}
