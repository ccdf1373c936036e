//! OpenAI API Provider
//!
//! Chat Completions against OpenAI or any OpenAI-compatible host.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    Completion, CompletionOptions, LlmProvider, ProviderConfig, TokenUsage, empty_response,
    http_client, http_error, transport_error, validate_endpoint,
};
use crate::constants::network::{HEALTH_CHECK_TIMEOUT_SECS, OPENAI_DEFAULT_ENDPOINT};
use crate::types::{ErrorCategory, LlmError, PaperdocError, Result};

/// OpenAI API Provider with secure API key handling
pub struct OpenAiProvider {
    /// Never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    model: String,
    system_prompt: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key_str = config
            .api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                PaperdocError::Config(
                    "OpenAI API key not found. Set OPENAI_API_KEY env var or llm.api_key"
                        .to_string(),
                )
            })?;

        let api_base = config
            .api_base
            .unwrap_or_else(|| OPENAI_DEFAULT_ENDPOINT.to_string());

        Ok(Self {
            api_key: SecretString::from(api_key_str),
            api_base: validate_endpoint(&api_base, "OpenAI")?,
            model: config.model,
            system_prompt: config.system_prompt,
            client: http_client()?,
        })
    }

    fn build_request(&self, prompt: &str, options: &CompletionOptions) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if !self.system_prompt.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: Some(self.system_prompt.clone()),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: Some(prompt.to_string()),
        });

        ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: options.temperature,
            max_tokens: Some(options.max_output_tokens),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<Completion> {
        let request = self.build_request(prompt, options);
        let url = format!("{}/chat/completions", self.api_base);

        debug!(model = %self.model, prompt_chars = prompt.len(), "Sending request to OpenAI API");

        let response = self
            .client
            .post(&url)
            .timeout(options.timeout)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, "openai"))?;

        if !response.status().is_success() {
            return Err(http_error(response, "openai").await);
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| transport_error(e, "openai"))?;

        let usage = body
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| empty_response("openai", "No choices in OpenAI response"))?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(LlmError::with_provider(
                ErrorCategory::ContentPolicy,
                "Completion stopped by content filter",
                "openai",
            )
            .into());
        }

        let text = choice
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| empty_response("openai", "No content in OpenAI response"))?;

        Ok(Completion {
            text,
            usage,
            model: body.model.unwrap_or_else(|| self.model.clone()),
        })
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.api_base);

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                info!("OpenAI API is available");
                Ok(true)
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "OpenAI API check failed");
                Ok(false)
            }
            Err(e) => {
                warn!("OpenAI API check failed: {}", e);
                Ok(false)
            }
        }
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;

    fn config() -> ProviderConfig {
        let mut config = ProviderConfig::from_config(&LlmConfig::default(), "be precise");
        config.provider = "openai".to_string();
        config.model = "gpt-4o-mini".to_string();
        config.api_key = Some("sk-test".to_string());
        config
    }

    #[test]
    fn test_debug_redacts_key() {
        let provider = OpenAiProvider::new(config()).unwrap();
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("sk-test"));
        assert_eq!(provider.api_base, OPENAI_DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_request_shape() {
        let provider = OpenAiProvider::new(config()).unwrap();
        let options = CompletionOptions::from_config(&LlmConfig::default());
        let json = serde_json::to_value(provider.build_request("hello", &options)).unwrap();

        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["content"], "be precise");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["max_tokens"], options.max_output_tokens);
    }

    #[test]
    fn test_response_parsing() {
        let body: ChatCompletionResponse = serde_json::from_str(
            r#"{"model":"gpt-4o-mini","choices":[{"index":0,"message":{"role":"assistant","content":"Docs"},"finish_reason":"stop"}],"usage":{"prompt_tokens":10,"completion_tokens":2,"total_tokens":12}}"#,
        )
        .unwrap();
        assert_eq!(body.choices[0].message.content.as_deref(), Some("Docs"));
        assert_eq!(body.usage.unwrap().completion_tokens, 2);
    }
}
