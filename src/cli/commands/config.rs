//! Config Command
//!
//! Usage:
//!   paperdoc config show [-f toml|json|yaml]
//!   paperdoc config path
//!   paperdoc config init [--force]

use std::path::Path;

use crate::config::{ConfigFormat, ConfigLoader};
use crate::types::{PaperdocError, Result};

pub fn parse_format(format: &str) -> Result<ConfigFormat> {
    match format.to_lowercase().as_str() {
        "toml" => Ok(ConfigFormat::Toml),
        "json" => Ok(ConfigFormat::Json),
        "yaml" | "yml" => Ok(ConfigFormat::Yaml),
        other => Err(PaperdocError::Config(format!(
            "Unknown format '{}'. Valid values: toml, json, yaml",
            other
        ))),
    }
}

/// Print the effective (merged) configuration
pub fn show(explicit: Option<&Path>, format: &str) -> Result<()> {
    let config = ConfigLoader::load(explicit)?;
    println!("{}", ConfigLoader::render(&config, parse_format(format)?)?);
    Ok(())
}

pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}

/// Write `paperdoc.toml` in the working directory
pub fn init(force: bool) -> Result<()> {
    let dir = std::env::current_dir()?;
    let path = ConfigLoader::init_project(&dir, force)?;
    println!("✓ Project configuration: {}", path.display());
    if let Some(global) = ConfigLoader::global_config_path() {
        println!("  Global overrides:      {}", global.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format("JSON").unwrap(), ConfigFormat::Json);
        assert_eq!(parse_format("yml").unwrap(), ConfigFormat::Yaml);
        assert!(parse_format("ini").is_err());
    }
}
