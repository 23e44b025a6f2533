//! Scan configuration
//!
//! Typed options for a single pipeline run. Values come from defaults, an
//! optional JSON configuration file and finally command-line overrides.

use std::path::Path;

use log::{error, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collaborators::classifier::DEFAULT_BATCH_SIZE;

/// Default window size: 10 MiB of new data per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Invalid configuration values
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("chunk_size_bytes must be greater than zero")]
    ZeroChunkSize,

    #[error("max_chunks must be greater than zero")]
    ZeroMaxChunks,

    #[error("string length bounds are inverted: min {min} > max {max}")]
    InvertedStringBounds { min: usize, max: usize },

    #[error("string_min_len must be at least 1")]
    ZeroStringMinLen,

    #[error("chunk size {chunk} is smaller than the longest pattern ({pattern} bytes)")]
    ChunkSmallerThanPattern { chunk: usize, pattern: usize },

    #[error("chunk size of {0} MiB does not fit in memory addresses")]
    ChunkSizeOverflow(usize),
}

/// Convert a chunk size given in MiB to bytes
pub fn chunk_size_from_mb(megabytes: usize) -> Result<usize, ConfigError> {
    megabytes
        .checked_mul(1024 * 1024)
        .ok_or(ConfigError::ChunkSizeOverflow(megabytes))
}

/// Which concept hunter variant runs over the scanned data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HuntMode {
    /// Keyword search over extracted printable strings
    #[default]
    Strings,
    /// Keyword search over the raw, case-folded chunk text
    Payroll,
}

/// Pattern used when the specific amount pattern yields too little
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPattern {
    /// Bare number with at least two integer and 2-4 fractional digits
    #[default]
    Generic,
    /// Isolated number with 1-10 integer and exactly 2 fractional digits
    Strict,
}

/// Options recognised by the extraction pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Bytes of new data read per chunk
    pub chunk_size_bytes: usize,

    /// Cap on the number of chunks read; large files are sampled, not fully scanned
    pub max_chunks: usize,

    /// Minimum trimmed length of a printable string
    pub string_min_len: usize,

    /// Maximum trimmed length of a printable string
    pub string_max_len: usize,

    /// Generic amounts are only collected while fewer unique amounts than this exist
    pub amount_fallback_threshold: usize,

    pub fallback_pattern: FallbackPattern,

    pub hunt_mode: HuntMode,

    /// Require keyword hits to sit on word boundaries
    pub word_boundary: bool,

    /// Unique dates retained
    pub max_dates: usize,

    /// Printable strings retained as samples
    pub max_strings: usize,

    /// Number of keywords listed in `top_keywords`
    pub top_keywords: usize,

    /// Number of literal keyword hits kept for review
    pub sample_hits: usize,

    /// Identifiers listed in the report and sent to the risk classifier
    pub identifier_sample: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            max_chunks: 30,
            string_min_len: 5,
            string_max_len: 99,
            amount_fallback_threshold: 100,
            fallback_pattern: FallbackPattern::Generic,
            hunt_mode: HuntMode::Strings,
            word_boundary: false,
            max_dates: 500,
            max_strings: 1000,
            top_keywords: 5,
            sample_hits: 20,
            identifier_sample: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ScanConfig {
    /// Check the configuration for values that would break the pipeline
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size_bytes == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.max_chunks == 0 {
            return Err(ConfigError::ZeroMaxChunks);
        }
        if self.string_min_len == 0 {
            return Err(ConfigError::ZeroStringMinLen);
        }
        if self.string_min_len > self.string_max_len {
            return Err(ConfigError::InvertedStringBounds {
                min: self.string_min_len,
                max: self.string_max_len,
            });
        }
        Ok(())
    }

    /// Total number of bytes the scan may read
    pub fn byte_budget(&self) -> u64 {
        (self.chunk_size_bytes as u64).saturating_mul(self.max_chunks as u64)
    }
}

/// Load configuration from a JSON file
///
/// A missing or malformed file is logged and the defaults are used instead,
/// so a typo in the config never prevents a scan from running.
///
/// # Arguments
///
/// * `config_path` - Optional path to a JSON configuration file
///
/// # Returns
///
/// The loaded configuration, or the defaults
pub fn load_config(config_path: Option<&Path>) -> ScanConfig {
    let Some(path) = config_path else {
        return ScanConfig::default();
    };

    if !path.exists() {
        error!("Configuration file not found: {}", path.display());
        return ScanConfig::default();
    }

    match std::fs::read_to_string(path) {
        Ok(config_str) => match serde_json::from_str::<ScanConfig>(&config_str) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                error!("Invalid JSON in configuration file: {}", e);
                ScanConfig::default()
            }
        },
        Err(e) => {
            error!("Could not read configuration file {}: {}", path.display(), e);
            ScanConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScanConfig::default();
        assert_eq!(config.chunk_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.amount_fallback_threshold, 100);
        assert_eq!(config.identifier_sample, DEFAULT_BATCH_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ScanConfig =
            serde_json::from_str(r#"{"max_chunks": 3, "hunt_mode": "payroll"}"#).unwrap();
        assert_eq!(config.max_chunks, 3);
        assert_eq!(config.hunt_mode, HuntMode::Payroll);
        assert_eq!(config.string_max_len, 99);
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let config = ScanConfig {
            string_min_len: 10,
            string_max_len: 5,
            ..ScanConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvertedStringBounds { min: 10, max: 5 })
        );

        let config = ScanConfig {
            chunk_size_bytes: 0,
            ..ScanConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroChunkSize));
    }

    #[test]
    fn test_chunk_size_from_mb() {
        assert_eq!(chunk_size_from_mb(4), Ok(4 * 1024 * 1024));
        assert_eq!(
            chunk_size_from_mb(usize::MAX),
            Err(ConfigError::ChunkSizeOverflow(usize::MAX))
        );
    }

    #[test]
    fn test_missing_config_file_falls_back() {
        let config = load_config(Some(Path::new("/nonexistent/bak_forensics.json")));
        assert_eq!(config, ScanConfig::default());
    }
}
