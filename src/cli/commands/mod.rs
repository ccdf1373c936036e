//! CLI subcommands
//!
//! Each command loads the layered configuration, applies its flag
//! overrides, and drives the library. Async work runs on a runtime owned
//! by the command.

pub mod config;
pub mod extract;
pub mod generate;
pub mod health;
pub mod index;

use std::path::{Path, PathBuf};

use crate::config::{Config, ConfigLoader};
use crate::types::Result;

/// Flag overrides shared by commands that touch the source tree or corpus
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub source: Option<PathBuf>,
    pub papers: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub concurrency: Option<usize>,
    pub top_k: Option<usize>,
}

impl Overrides {
    /// CLI arguments are the last configuration layer
    pub fn apply(&self, config: &mut Config) {
        if let Some(source) = &self.source {
            config.sources.root = source.clone();
        }
        if let Some(papers) = &self.papers {
            config.corpus.dir = papers.clone();
        }
        if let Some(output) = &self.output {
            config.output.dir = output.clone();
        }
        if let Some(provider) = &self.provider {
            config.llm.provider = provider.clone();
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.pipeline.concurrency = concurrency;
        }
        if let Some(top_k) = self.top_k {
            config.retrieval.top_k = top_k;
        }
    }
}

/// Layered configuration with CLI overrides, validated
pub fn load_config(explicit: Option<&Path>, overrides: &Overrides) -> Result<Config> {
    let mut config = ConfigLoader::load(explicit)?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_config_values() {
        let mut config = Config::default();
        Overrides {
            source: Some(PathBuf::from("src")),
            model: Some("llama3.1".to_string()),
            concurrency: Some(8),
            top_k: Some(0),
            ..Default::default()
        }
        .apply(&mut config);

        assert_eq!(config.sources.root, PathBuf::from("src"));
        assert_eq!(config.llm.model, "llama3.1");
        assert_eq!(config.pipeline.concurrency, 8);
        assert_eq!(config.retrieval.top_k, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_override_is_rejected() {
        let mut config = Config::default();
        Overrides {
            concurrency: Some(0),
            ..Default::default()
        }
        .apply(&mut config);
        assert!(config.validate().is_err());
    }
}
