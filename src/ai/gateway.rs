//! LLM Gateway
//!
//! Wraps a provider with the run's resilience policy.
//!
//! ## Attempt state machine
//!
//! Every call is one `Attempt(n)` whose result is classified into an
//! [`AttemptOutcome`]:
//!
//! - `Success`: the completion is returned
//! - `RetryAfter(delay)`: transient failure (timeout, 5xx, network, rate
//!   limit) with retry budget left; sleep `delay` then attempt again
//! - `Terminal`: non-transient failure (auth, bad request, content policy,
//!   unclassified) or retry budget exhausted
//!
//! A provider that always fails transiently is called exactly
//! `max_retries + 1` times. Delays follow an exponential schedule with
//! optional jitter; rate-limit signals wait at least the provider's
//! `Retry-After` or the configured floor.

use std::time::{Duration, Instant};

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use rand::Rng;
use tracing::{debug, info, instrument, warn};

use super::prompt::Prompt;
use super::provider::{Completion, CompletionOptions, SharedProvider, TokenUsage};
use super::timeout::with_timeout;
use crate::config::LlmConfig;
use crate::constants::gateway::JITTER_FRACTION;
use crate::pipeline::CancellationToken;
use crate::types::{ErrorCategory, ErrorClassifier, FailureKind, LlmError, Result};

// =============================================================================
// Retry Policy
// =============================================================================

/// Retry schedule derived from `[llm]` configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub factor: f32,
    pub jitter: bool,
    /// Minimum wait after a rate-limit signal without `Retry-After`
    pub rate_limit_wait: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_secs(config.max_delay_secs),
            factor: config.backoff_factor as f32,
            jitter: config.jitter,
            rate_limit_wait: Duration::from_secs(config.rate_limit_wait_secs),
        }
    }

    /// Backoff schedule yielding one delay per permitted retry
    pub fn schedule(&self) -> ExponentialBackoff {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay.max(self.base_delay))
            .with_factor(self.factor.max(1.0))
            .with_max_times(self.max_retries as usize)
            .build()
    }

    /// Classify one attempt.
    ///
    /// `next_delay` is the next entry of [`Self::schedule`]; `None` means
    /// the retry budget is spent.
    pub fn outcome(
        &self,
        result: Result<Completion>,
        next_delay: Option<Duration>,
        provider: &str,
    ) -> AttemptOutcome {
        let err = match result {
            Ok(completion) => return AttemptOutcome::Success(completion),
            Err(e) => ErrorClassifier::classify_error(&e, provider),
        };

        if !err.is_transient() {
            return AttemptOutcome::Terminal(err);
        }

        let Some(delay) = next_delay else {
            return AttemptOutcome::Terminal(err);
        };

        let mut delay = if self.jitter {
            delay + random_jitter(delay)
        } else {
            delay
        };

        if err.category == ErrorCategory::RateLimit {
            delay = delay.max(err.retry_after.unwrap_or(self.rate_limit_wait));
        }

        AttemptOutcome::RetryAfter { delay, error: err }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}

/// Up to a quarter of `base_delay`, uniformly drawn
fn random_jitter(base_delay: Duration) -> Duration {
    let max_jitter_ms = (base_delay.as_millis() as u64) / JITTER_FRACTION;
    if max_jitter_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_jitter_ms))
}

/// Result of classifying one attempt
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(Completion),
    RetryAfter { delay: Duration, error: LlmError },
    Terminal(LlmError),
}

// =============================================================================
// Generation Result
// =============================================================================

/// Successful generation with its cost
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub provider: String,
    pub model: String,
    /// Provider calls made, including the successful one
    pub attempts: u32,
    pub latency: Duration,
    pub usage: TokenUsage,
}

/// Terminal generation failure for one unit
#[derive(Debug, Clone)]
pub struct GenerationFailure {
    pub kind: FailureKind,
    pub category: ErrorCategory,
    pub message: String,
    pub attempts: u32,
}

/// Outcome of [`Gateway::generate`]
#[derive(Debug, Clone)]
pub enum GenerationResult {
    Success(Generation),
    Failure(GenerationFailure),
    /// Cancellation arrived between attempts
    Cancelled { attempts: u32 },
}

impl GenerationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success(g) => g.attempts,
            Self::Failure(f) => f.attempts,
            Self::Cancelled { attempts } => *attempts,
        }
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Provider-agnostic generation with retry, backoff, timeout, and
/// rate-limit handling
#[derive(Clone)]
pub struct Gateway {
    provider: SharedProvider,
    policy: RetryPolicy,
    options: CompletionOptions,
    cancel: CancellationToken,
}

impl Gateway {
    pub fn new(provider: SharedProvider, policy: RetryPolicy, options: CompletionOptions) -> Self {
        Self {
            provider,
            policy,
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(provider: SharedProvider, config: &LlmConfig) -> Self {
        Self::new(
            provider,
            RetryPolicy::from_config(config),
            CompletionOptions::from_config(config),
        )
    }

    /// Interrupt backoff sleeps when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn options(&self) -> &CompletionOptions {
        &self.options
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.provider.health_check().await
    }

    /// Generate documentation for a composed prompt
    #[instrument(skip(self, prompt), fields(unit = %prompt.unit, provider = %self.provider.name()))]
    pub async fn generate(&self, prompt: &Prompt) -> GenerationResult {
        self.run(&prompt.text, &self.options).await
    }

    /// Short auxiliary completion (query description, relevance check)
    pub async fn ask(&self, text: &str, max_output_tokens: u32) -> Result<String> {
        let options = self.options.clone().with_max_output_tokens(max_output_tokens);
        match self.run(text, &options).await {
            GenerationResult::Success(g) => Ok(g.text),
            GenerationResult::Failure(f) => {
                Err(LlmError::with_provider(f.category, f.message, self.provider.name()).into())
            }
            GenerationResult::Cancelled { .. } => Err(LlmError::with_provider(
                ErrorCategory::Unknown,
                "cancelled",
                self.provider.name(),
            )
            .into()),
        }
    }

    async fn run(&self, text: &str, options: &CompletionOptions) -> GenerationResult {
        let provider_name = self.provider.name().to_string();
        let started = Instant::now();
        let mut schedule = self.policy.schedule();
        let mut attempts = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                info!(attempts, "Cancelled before attempt");
                return GenerationResult::Cancelled { attempts };
            }

            attempts += 1;
            let result = with_timeout(
                options.timeout,
                self.provider.complete(text, options),
                &format!("{} completion", provider_name),
            )
            .await;

            match self.policy.outcome(result, schedule.next(), &provider_name) {
                AttemptOutcome::Success(completion) => {
                    debug!(
                        attempts,
                        latency_ms = started.elapsed().as_millis() as u64,
                        output_tokens = completion.usage.output_tokens,
                        "Generation succeeded"
                    );
                    return GenerationResult::Success(Generation {
                        text: completion.text,
                        provider: provider_name,
                        model: completion.model,
                        attempts,
                        latency: started.elapsed(),
                        usage: completion.usage,
                    });
                }
                AttemptOutcome::RetryAfter { delay, error } => {
                    warn!(
                        attempt = attempts,
                        category = %error.category,
                        delay_ms = delay.as_millis() as u64,
                        error = %error.message,
                        "Transient provider failure, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => {
                            info!(attempts, "Cancelled during backoff");
                            return GenerationResult::Cancelled { attempts };
                        }
                    }
                }
                AttemptOutcome::Terminal(error) => {
                    let message = if error.is_transient() {
                        format!("retries exhausted after {} attempts: {}", attempts, error)
                    } else {
                        error.to_string()
                    };
                    warn!(attempts, category = %error.category, "Generation failed: {}", message);
                    return GenerationResult::Failure(GenerationFailure {
                        kind: error.category.failure_kind(),
                        category: error.category,
                        message,
                        attempts,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::mock::MockProvider;
    use crate::types::{IndexId, PaperdocError, UnitId};
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            factor: 2.0,
            jitter: false,
            rate_limit_wait: Duration::from_millis(1),
        }
    }

    fn options() -> CompletionOptions {
        CompletionOptions {
            temperature: 0.0,
            max_output_tokens: 64,
            timeout: Duration::from_secs(5),
        }
    }

    fn prompt() -> Prompt {
        Prompt {
            text: "Document this function".to_string(),
            unit: UnitId {
                file: "a.cpp".into(),
                qualified_name: "f".to_string(),
                start_line: 1,
                end_line: 3,
                start_byte: 0,
                end_byte: 20,
            },
            chunks: Vec::new(),
            index: IndexId::new(),
            template_version: "test".to_string(),
        }
    }

    fn gateway(mock: &Arc<MockProvider>, policy: RetryPolicy) -> Gateway {
        Gateway::new(mock.clone(), policy, options())
    }

    #[tokio::test]
    async fn test_always_transient_calls_n_plus_one_times() {
        let mock = Arc::new(MockProvider::always_failing(ErrorCategory::Transient));
        let result = gateway(&mock, fast_policy(3)).generate(&prompt()).await;

        assert_eq!(mock.calls(), 4);
        match result {
            GenerationResult::Failure(f) => {
                assert_eq!(f.kind, FailureKind::ProviderTransient);
                assert_eq!(f.attempts, 4);
                assert!(f.message.contains("retries exhausted"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_retries_calls_once() {
        let mock = Arc::new(MockProvider::always_failing(ErrorCategory::Timeout));
        let result = gateway(&mock, fast_policy(0)).generate(&prompt()).await;
        assert_eq!(mock.calls(), 1);
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn test_auth_error_is_not_retried() {
        let mock = Arc::new(MockProvider::always_failing(ErrorCategory::Auth));
        let result = gateway(&mock, fast_policy(3)).generate(&prompt()).await;

        assert_eq!(mock.calls(), 1);
        match result {
            GenerationResult::Failure(f) => assert_eq!(f.kind, FailureKind::ProviderTerminal),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_content_policy_and_bad_request_are_terminal() {
        for category in [ErrorCategory::ContentPolicy, ErrorCategory::BadRequest] {
            let mock = Arc::new(MockProvider::always_failing(category));
            gateway(&mock, fast_policy(3)).generate(&prompt()).await;
            assert_eq!(mock.calls(), 1, "{} should not be retried", category);
        }
    }

    #[tokio::test]
    async fn test_fail_twice_then_succeed() {
        let mock = Arc::new(MockProvider::failing_then_ok(2, ErrorCategory::Transient));
        let result = gateway(&mock, fast_policy(3)).generate(&prompt()).await;

        assert_eq!(mock.calls(), 3);
        match result {
            GenerationResult::Success(g) => {
                assert_eq!(g.attempts, 3);
                assert_eq!(g.provider, "mock");
                assert_eq!(g.text, "Generated documentation.");
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_waits_at_least_retry_after() {
        let mock = Arc::new(
            MockProvider::failing_then_ok(1, ErrorCategory::RateLimit)
                .with_retry_after(Duration::from_millis(60)),
        );
        let started = Instant::now();
        let result = gateway(&mock, fast_policy(2)).generate(&prompt()).await;

        assert!(result.is_success());
        assert_eq!(mock.calls(), 2);
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_transient() {
        let mock = Arc::new(MockProvider::ok().with_delay(Duration::from_millis(200)));
        let gateway = Gateway::new(
            mock.clone(),
            fast_policy(1),
            CompletionOptions {
                timeout: Duration::from_millis(20),
                ..options()
            },
        );
        let result = gateway.generate(&prompt()).await;

        assert_eq!(mock.calls(), 2);
        match result {
            GenerationResult::Failure(f) => assert_eq!(f.category, ErrorCategory::Timeout),
            other => panic!("expected timeout failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let mock = Arc::new(MockProvider::always_failing(ErrorCategory::Transient));
        let cancel = CancellationToken::new();
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30),
            ..fast_policy(3)
        };
        let gateway = gateway(&mock, policy).with_cancellation(cancel.clone());

        let handle = tokio::spawn(async move { gateway.generate(&prompt()).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("cancel should interrupt backoff")
            .unwrap();
        assert!(matches!(result, GenerationResult::Cancelled { attempts: 1 }));
        assert_eq!(mock.calls(), 1);
    }

    #[test]
    fn test_outcome_classification() {
        let policy = fast_policy(3);
        let auth: Result<Completion> =
            Err(LlmError::new(ErrorCategory::Auth, "denied").into());
        assert!(matches!(
            policy.outcome(auth, Some(Duration::from_millis(1)), "p"),
            AttemptOutcome::Terminal(_)
        ));

        let transient: Result<Completion> =
            Err(LlmError::new(ErrorCategory::Transient, "503").into());
        assert!(matches!(
            policy.outcome(transient, None, "p"),
            AttemptOutcome::Terminal(_)
        ));

        let timeout: Result<Completion> =
            Err(PaperdocError::timeout("call", Duration::from_secs(1)));
        match policy.outcome(timeout, Some(Duration::from_millis(2)), "p") {
            AttemptOutcome::RetryAfter { delay, error } => {
                assert_eq!(delay, Duration::from_millis(2));
                assert_eq!(error.category, ErrorCategory::Timeout);
            }
            other => panic!("expected retry, got {:?}", other),
        }
    }

    #[test]
    fn test_rate_limit_floor_from_config() {
        let policy = RetryPolicy {
            rate_limit_wait: Duration::from_secs(10),
            ..fast_policy(3)
        };
        let limited: Result<Completion> =
            Err(LlmError::new(ErrorCategory::RateLimit, "429").into());
        match policy.outcome(limited, Some(Duration::from_millis(1)), "p") {
            AttemptOutcome::RetryAfter { delay, .. } => {
                assert_eq!(delay, Duration::from_secs(10))
            }
            other => panic!("expected retry, got {:?}", other),
        }
    }

    #[test]
    fn test_schedule_is_bounded_and_capped() {
        let delays: Vec<_> = fast_policy(5).schedule().collect();
        assert_eq!(delays.len(), 5);
        assert_eq!(delays[0], Duration::from_millis(1));
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(4)));
    }

    #[test]
    fn test_random_jitter_bounds() {
        let jitter = random_jitter(Duration::from_millis(1000));
        assert!(jitter < Duration::from_millis(250));
        assert_eq!(random_jitter(Duration::from_millis(3)), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_ask_surfaces_failure_as_error() {
        let mock = Arc::new(MockProvider::always_failing(ErrorCategory::Auth));
        let err = gateway(&mock, fast_policy(1)).ask("describe", 50).await.unwrap_err();
        assert!(matches!(err, PaperdocError::Llm(_)));
    }
}
