//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config ($XDG_CONFIG_HOME/paperdoc/config.toml)
//! 3. Project config (paperdoc.toml / config.yaml) or `--config`
//! 4. Environment variables (PAPERDOC_*)
//! 5. CLI arguments (highest priority)

mod loader;
mod types;

pub use loader::{ConfigFormat, ConfigLoader};
pub use types::*;
