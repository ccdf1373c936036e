//! Ollama Local LLM Provider
//!
//! Completion against a locally-running Ollama server via `/api/chat`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    Completion, CompletionOptions, LlmProvider, ProviderConfig, TokenUsage, empty_response,
    http_client, http_error, transport_error, validate_endpoint,
};
use crate::constants::network::{HEALTH_CHECK_TIMEOUT_SECS, OLLAMA_DEFAULT_ENDPOINT};
use crate::types::{ErrorCategory, LlmError, Result};

/// Ollama Local LLM Provider
pub struct OllamaProvider {
    api_base: String,
    model: String,
    system_prompt: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_base = config
            .api_base
            .unwrap_or_else(|| OLLAMA_DEFAULT_ENDPOINT.to_string());

        Ok(Self {
            api_base: validate_endpoint(&api_base, "Ollama")?,
            model: config.model,
            system_prompt: config.system_prompt,
            client: http_client()?,
        })
    }

    fn build_request(&self, prompt: &str, options: &CompletionOptions) -> OllamaChatRequest {
        let mut messages = Vec::with_capacity(2);
        if !self.system_prompt.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: self.system_prompt.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        OllamaChatRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_output_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<Completion> {
        let request = self.build_request(prompt, options);
        let url = format!("{}/api/chat", self.api_base);

        debug!(model = %self.model, prompt_chars = prompt.len(), "Sending request to Ollama");

        let response = self
            .client
            .post(&url)
            .timeout(options.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    LlmError::with_provider(
                        ErrorCategory::Network,
                        format!(
                            "Failed to connect to Ollama at {}. Is Ollama running? Start with: ollama serve",
                            self.api_base
                        ),
                        "ollama",
                    )
                    .into()
                } else {
                    transport_error(e, "ollama")
                }
            })?;

        if !response.status().is_success() {
            return Err(http_error(response, "ollama").await);
        }

        let body: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| transport_error(e, "ollama"))?;

        if body.message.content.trim().is_empty() {
            return Err(empty_response("ollama", "Ollama returned an empty message"));
        }

        Ok(Completion {
            text: body.message.content,
            usage: TokenUsage::new(
                body.prompt_eval_count.unwrap_or(0),
                body.eval_count.unwrap_or(0),
            ),
            model: body.model.unwrap_or_else(|| self.model.clone()),
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.api_base);

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                if let Ok(tags) = resp.json::<OllamaTagsResponse>().await {
                    let wanted = self.model.trim_end_matches(":latest");
                    let model_available = tags
                        .models
                        .iter()
                        .any(|m| m.name == self.model || m.name.trim_end_matches(":latest") == wanted);

                    if model_available {
                        info!(model = %self.model, "Ollama is available");
                        Ok(true)
                    } else {
                        warn!(
                            "Ollama is running but model '{}' not found. Pull with: ollama pull {}",
                            self.model, self.model
                        );
                        Ok(false)
                    }
                } else {
                    info!("Ollama is available");
                    Ok(true)
                }
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "Ollama API check failed");
                Ok(false)
            }
            Err(e) => {
                warn!("Ollama not available: {}. Start with: ollama serve", e);
                Ok(false)
            }
        }
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: Option<String>,
    message: ChatMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::constants::prompt::DEFAULT_SYSTEM_PROMPT;

    fn provider() -> OllamaProvider {
        OllamaProvider::new(ProviderConfig::from_config(
            &LlmConfig::default(),
            DEFAULT_SYSTEM_PROMPT,
        ))
        .expect("Failed to create provider")
    }

    #[test]
    fn test_default_endpoint() {
        assert_eq!(provider().api_base, OLLAMA_DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_request_carries_system_prompt_and_options() {
        let options = CompletionOptions::from_config(&LlmConfig::default());
        let request = provider().build_request("document this", &options);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "document this");
        assert_eq!(json["options"]["num_predict"], options.max_output_tokens);
    }

    #[test]
    fn test_response_parsing() {
        let body: OllamaChatResponse = serde_json::from_str(
            r#"{"model":"llama3.1","message":{"role":"assistant","content":"Docs"},"prompt_eval_count":12,"eval_count":3,"done":true}"#,
        )
        .unwrap();
        assert_eq!(body.message.content, "Docs");
        assert_eq!(body.eval_count, Some(3));
    }

    #[test]
    fn test_rejects_non_http_endpoint() {
        let mut config = ProviderConfig::from_config(&LlmConfig::default(), "");
        config.api_base = Some("ftp://localhost".to_string());
        assert!(OllamaProvider::new(config).is_err());
    }
}
