//! Scripted provider for gateway and pipeline tests.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{Completion, CompletionOptions, LlmProvider, TokenUsage};
use crate::types::{ErrorCategory, LlmError, Result};

type Reply = Box<dyn Fn(&str) -> String + Send + Sync>;

pub(crate) struct MockProvider {
    failures: u32,
    category: ErrorCategory,
    retry_after: Option<Duration>,
    delay: Duration,
    reply: Reply,
    calls: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockProvider {
    /// Always succeeds
    pub fn ok() -> Self {
        Self::failing_then_ok(0, ErrorCategory::Transient)
    }

    /// Fails `failures` times with `category`, then succeeds
    pub fn failing_then_ok(failures: u32, category: ErrorCategory) -> Self {
        Self {
            failures,
            category,
            retry_after: None,
            delay: Duration::ZERO,
            reply: Box::new(|_| "Generated documentation.".to_string()),
            calls: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Never succeeds
    pub fn always_failing(category: ErrorCategory) -> Self {
        Self::failing_then_ok(u32::MAX, category)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn with_reply(mut self, reply: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.reply = Box::new(reply);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn complete(&self, prompt: &str, _options: &CompletionOptions) -> Result<Completion> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if call < self.failures {
            let mut err = LlmError::with_provider(self.category, "scripted failure", "mock");
            if let Some(wait) = self.retry_after {
                err = err.retry_after(wait);
            }
            return Err(err.into());
        }

        Ok(Completion {
            text: (self.reply)(prompt),
            usage: TokenUsage::new(10, 5),
            model: "mock-model".to_string(),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.failures == 0)
    }
}
