//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config ($XDG_CONFIG_HOME/paperdoc/config.toml)
//! 3. Project config (paperdoc.toml, config.yaml, config.yml) or an explicit file
//! 4. Environment variables (PAPERDOC_* prefix, `__` separates sections)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml, Yaml},
};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{PaperdocError, Result};

/// Project config candidates, checked in order
const PROJECT_CONFIG_FILES: &[&str] = &["paperdoc.toml", "config.yaml", "config.yml"];

/// Output format for `config show`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
    Yaml,
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain:
    /// defaults → global → project (or explicit file) → env vars
    pub fn load(explicit: Option<&Path>) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = Self::merge_file(figment, &global_path);
        }

        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(PaperdocError::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                debug!("Loading config from: {}", path.display());
                figment = Self::merge_file(figment, path);
            }
            None => {
                if let Some(project_path) = Self::project_config_path() {
                    debug!("Loading project config from: {}", project_path.display());
                    figment = Self::merge_file(figment, &project_path);
                }
            }
        }

        // e.g., PAPERDOC_LLM__MODEL -> llm.model
        figment = figment.merge(Env::prefixed("PAPERDOC_").split("__").lowercase(true));

        let config: Config = figment
            .extract()
            .map_err(|e| PaperdocError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file only (no global, no env)
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config =
            Self::merge_file(Figment::new().merge(Serialized::defaults(Config::default())), path)
                .extract()
                .map_err(|e| PaperdocError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn merge_file(figment: Figment, path: &Path) -> Figment {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => figment.merge(Yaml::file(path)),
            _ => figment.merge(Toml::file(path)),
        }
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Global config directory (`$XDG_CONFIG_HOME/paperdoc` on Linux)
    pub fn global_dir() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|dirs| dirs.config_dir().join("paperdoc"))
    }

    /// Get path to global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// First existing project config in the working directory
    pub fn project_config_path() -> Option<PathBuf> {
        PROJECT_CONFIG_FILES
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Show config file paths
    pub fn show_path() {
        println!("Configuration paths:");
        println!();

        if let Some(global) = Self::global_config_path() {
            let exists = if global.exists() { "✓" } else { "✗" };
            println!("  Global:  {} {}", exists, global.display());
        } else {
            println!("  Global:  (not available)");
        }

        match Self::project_config_path() {
            Some(project) => println!("  Project: ✓ {}", project.display()),
            None => println!("  Project: ✗ {}", PROJECT_CONFIG_FILES.join(" | ")),
        }
    }

    /// Render the effective configuration
    pub fn render(config: &Config, format: ConfigFormat) -> Result<String> {
        match format {
            ConfigFormat::Json => Ok(serde_json::to_string_pretty(config)?),
            ConfigFormat::Yaml => Ok(serde_yaml::to_string(config)?),
            ConfigFormat::Toml => {
                toml::to_string_pretty(config).map_err(|e| PaperdocError::Config(e.to_string()))
            }
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Write a commented default project config
    pub fn init_project(dir: &Path, force: bool) -> Result<PathBuf> {
        let config_path = dir.join("paperdoc.toml");
        if config_path.exists() && !force {
            info!("Project config exists: {}", config_path.display());
            return Ok(config_path);
        }

        fs::create_dir_all(dir)?;
        fs::write(&config_path, Self::default_project_config())?;
        info!("Created project config: {}", config_path.display());
        Ok(config_path)
    }

    /// Generate default project config content (TOML)
    fn default_project_config() -> String {
        r#"# paperdoc project configuration
# Environment variables override this file, e.g. PAPERDOC_LLM__MODEL=llama3.1

version = "1.0"

[sources]
root = "."
extensions = ["cpp", "cc", "cxx", "hpp", "hxx", "hh", "h"]
exclude = [".git/**", "build/**", "third_party/**"]

[corpus]
dir = "papers"
chunking = "fixed"        # fixed | paragraph
chunk_size = 1000
chunk_overlap = 200
representation = "lexical" # lexical | embedding

[corpus.embedding]
provider = "hashing"       # hashing | ollama | openai
model = "nomic-embed-text"

[retrieval]
top_k = 3
query_mode = "code"        # code | described
relevance_gate = false

[prompt]
budget = 12000
budget_unit = "chars"      # chars | tokens

[llm]
provider = "ollama"        # ollama | openai | gemini
model = "llama3.1"
timeout_secs = 120
temperature = 0.7
max_retries = 3

[output]
dir = "docs"
write_failure_placeholder = false

[pipeline]
concurrency = 4
"#
        .to_string()
    }
}
