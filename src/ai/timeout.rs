//! Per-attempt timeout helpers
//!
//! ## Usage
//!
//! ```ignore
//! use crate::ai::timeout::with_timeout;
//!
//! let text = with_timeout(
//!     Duration::from_secs(120),
//!     provider.complete(&prompt, &options),
//!     "ollama completion",
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use crate::types::{PaperdocError, Result};

/// Execute an async operation with a timeout
///
/// Returns [`PaperdocError::Timeout`] if the operation doesn't complete
/// within `timeout`; the future is dropped at that point.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(PaperdocError::timeout(operation_name, timeout)),
    }
}
