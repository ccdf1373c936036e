//! Health Command
//!
//! Check that the configured provider is reachable and serves the model.

use std::path::PathBuf;
use std::time::Duration;

use tokio::runtime::Runtime;

use super::{Overrides, load_config};
use crate::ai::{ProviderConfig, create_provider, with_timeout};
use crate::cli::Output;
use crate::constants::network::HEALTH_CHECK_TIMEOUT_SECS;
use crate::types::Result;

/// Returns whether the provider is healthy
pub fn run(config: Option<PathBuf>, provider: Option<String>, model: Option<String>) -> Result<bool> {
    let overrides = Overrides {
        provider,
        model,
        ..Default::default()
    };
    let config = load_config(config.as_deref(), &overrides)?;
    let out = Output::new();

    let provider = create_provider(&ProviderConfig::from_config(
        &config.llm,
        &config.prompt.system_prompt,
    ))?;
    let label = format!("{} ({})", provider.name(), provider.model());

    let rt = Runtime::new()?;
    let healthy = rt.block_on(with_timeout(
        Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS),
        provider.health_check(),
        "health check",
    ));

    match healthy {
        Ok(true) => {
            out.success(&format!("{} is ready", label));
            Ok(true)
        }
        Ok(false) => {
            out.error(&format!("{} is reachable but the model is unavailable", label));
            Ok(false)
        }
        Err(e) => {
            out.error(&format!("{} is unreachable: {}", label, e));
            Ok(false)
        }
    }
}
