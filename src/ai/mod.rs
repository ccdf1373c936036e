//! AI Integration Layer
//!
//! Prompt composition, the provider abstraction, and the retrying gateway
//! that sits between them.

pub mod gateway;
pub mod prompt;
pub mod provider;
pub mod timeout;
pub mod tokenizer;

pub use gateway::{
    AttemptOutcome, Gateway, Generation, GenerationFailure, GenerationResult, RetryPolicy,
};
pub use prompt::{Composer, Prompt, PromptTemplate};
pub use provider::{
    Completion, CompletionOptions, ErrorCategory, ErrorClassifier, GeminiProvider, LlmError,
    LlmProvider, OllamaProvider, OpenAiProvider, ProviderConfig, SharedProvider, TokenUsage,
    create_provider,
};
pub use timeout::with_timeout;
pub use tokenizer::{PromptMeasure, TokenCounter, TokenEstimator};
