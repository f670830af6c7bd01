//! Configuration loading and parsing

use anyhow::{Context, Result};
use lora_codec::CodecConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub codec: CodecConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One compact JSON document per line
    #[default]
    Json,
    /// Indented JSON
    Pretty,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Worker threads for batch replay; rayon's default when unset
    pub threads: Option<usize>,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if config.batch.threads == Some(0) {
        anyhow::bail!("Invalid config file {:?}: batch.threads must be at least 1", path);
    }

    Ok(config)
}
