//! TOML configuration for the silt CLI.
//!
//! All sections are optional; an empty config yields a store-less setup
//! (the CLI then requires `--dir`) with default blob and log settings.

use std::path::Path;

use serde::Deserialize;
use silt_blob::ReaderOptions;
use silt_chunks::FileStoreConfig;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// File store layout.
    pub store: FileStoreConfig,
    /// Blob tree shape and reader tuning.
    pub blob: BlobSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[blob]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BlobSection {
    /// Maximum leaf payload in bytes.
    pub leaf_size: Option<usize>,
    /// Children per compound node.
    pub fan_out: Option<usize>,
    /// Leaf buffer capacity in the reader.
    pub buffer: Option<usize>,
    /// Maximum chunk fetches in flight while reading.
    pub max_concurrent_derefs: Option<usize>,
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Effective maximum leaf payload (64 KB default).
    pub fn leaf_size(&self) -> usize {
        self.blob.leaf_size.unwrap_or(64 * 1024)
    }

    /// Effective compound fan-out.
    pub fn fan_out(&self) -> usize {
        self.blob.fan_out.unwrap_or(64)
    }

    /// Effective reader tuning.
    pub fn reader_options(&self) -> ReaderOptions {
        let defaults = ReaderOptions::default();
        ReaderOptions {
            buffer: self.blob.buffer.unwrap_or(defaults.buffer),
            max_concurrent_derefs: self
                .blob
                .max_concurrent_derefs
                .unwrap_or(defaults.max_concurrent_derefs),
        }
    }
}
