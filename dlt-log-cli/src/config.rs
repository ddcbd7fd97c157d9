//! Configuration loading and parsing

use anyhow::{Context, Result};
use dlt_log_decoder::{DecoderConfig, SearchPattern};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InputConfig {
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Decode files on the thread pool
    #[serde(default)]
    pub parallel: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    /// Output file (default: stdout)
    pub path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub include_diagnostics: bool,
    /// Maximum number of messages written
    pub limit: Option<usize>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            path: None,
            include_diagnostics: true,
            limit: None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Txt,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub patterns: Vec<SearchPattern>,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if config.decoder.read_chunk_size == 0 {
        anyhow::bail!("decoder.read_chunk_size must be greater than zero");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlt_log_decoder::{HeaderPrecedence, StringEncoding};

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [input]
            files = ["trace_1.dlt", "trace_2.dlt"]
            parallel = true

            [decoder]
            encoding = "utf8"
            require_storage_header = true
            timestamp_precedence = "standard_header"
            max_frames_per_file = 1000

            [output]
            format = "json"
            limit = 50

            [[search.patterns]]
            pattern = "engine"

            [[search.patterns]]
            pattern = "temp \\d+"
            is_regex = true
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.input.files.len(), 2);
        assert!(config.input.parallel);
        assert_eq!(config.decoder.encoding, StringEncoding::Utf8);
        assert!(config.decoder.require_storage_header);
        assert_eq!(config.decoder.timestamp_precedence, HeaderPrecedence::StandardHeader);
        assert_eq!(config.decoder.ecu_precedence, HeaderPrecedence::StorageHeader);
        assert_eq!(config.decoder.max_frames_per_file, Some(1000));
        assert!(config.decoder.decompress_gzip);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.output.limit, Some(50));
        assert!(config.output.include_diagnostics);
        assert_eq!(config.search.patterns.len(), 2);
        assert!(!config.search.patterns[0].is_regex);
        assert!(config.search.patterns[1].is_regex);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.input.files.is_empty());
        assert_eq!(config.decoder, DecoderConfig::default());
        assert_eq!(config.output.format, OutputFormat::Txt);
        assert!(config.search.patterns.is_empty());
    }

    #[test]
    fn test_load_config_errors_carry_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[decoder]\nencoding = \"ebcdic\"\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(format!("{}", err).contains("Failed to parse config file"));
        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }
}
