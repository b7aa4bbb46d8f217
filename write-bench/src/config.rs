//! Configuration for the write path driver.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use write_cache::align64;

/// Top-level configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub channel: ChannelConfig,
    #[serde(default)]
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// General run settings.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    /// Number of producer threads.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Optional time limit for the producers (e.g., "60s", "5m").
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub duration: Option<Duration>,
    /// Read every frame back through the channel after the run.
    #[serde(default = "default_true")]
    pub verify: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            duration: None,
            verify: true,
        }
    }
}

/// Write cache configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Total cache size (e.g., "64MB").
    #[serde(default = "default_cache_size", deserialize_with = "deserialize_size")]
    pub size: usize,
    /// Segment size, a power of two (e.g., "1MB").
    #[serde(
        default = "default_segment_size",
        deserialize_with = "deserialize_size"
    )]
    pub segment_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size: default_cache_size(),
            segment_size: default_segment_size(),
        }
    }
}

/// Buffered channel configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    /// Path of the entry log.
    pub path: PathBuf,
    /// Write buffer capacity.
    #[serde(
        default = "default_write_buffer",
        deserialize_with = "deserialize_size"
    )]
    pub write_buffer: usize,
    /// Read-ahead window capacity.
    #[serde(default = "default_read_buffer", deserialize_with = "deserialize_size")]
    pub read_buffer: usize,
    /// Flush once this many bytes are unpersisted. "0" disables the bound.
    #[serde(default, deserialize_with = "deserialize_size")]
    pub unpersisted_bytes_bound: usize,
    /// Sync file metadata as well as data when forcing.
    #[serde(default)]
    pub force_metadata: bool,
    /// Start from an empty log.
    #[serde(default = "default_true")]
    pub truncate: bool,
}

/// Workload configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkloadConfig {
    /// Distinct ledgers written by each thread.
    #[serde(default = "default_ledgers_per_thread")]
    pub ledgers_per_thread: usize,
    /// Entries written by each thread.
    #[serde(default = "default_entries")]
    pub entries: usize,
    /// Payload length of every entry.
    #[serde(default = "default_entry_size", deserialize_with = "deserialize_size")]
    pub entry_size: usize,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            ledgers_per_thread: default_ledgers_per_thread(),
            entries: default_entries(),
            entry_size: default_entry_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by RUST_LOG.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_true")]
    pub timestamps: bool,
    /// Include the event target (module path).
    #[serde(default)]
    pub target: bool,
    #[serde(default)]
    pub thread_names: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            timestamps: true,
            target: false,
            thread_names: false,
        }
    }
}

/// Log output format.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Compact => write!(f, "compact"),
        }
    }
}

fn default_threads() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_cache_size() -> usize {
    64 * 1024 * 1024
}

fn default_segment_size() -> usize {
    1024 * 1024
}

fn default_write_buffer() -> usize {
    64 * 1024
}

fn default_read_buffer() -> usize {
    8 * 1024
}

fn default_ledgers_per_thread() -> usize {
    1
}

fn default_entries() -> usize {
    10_000
}

fn default_entry_size() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.general.threads == 0 {
            return Err("threads must be at least 1".into());
        }

        if !self.cache.segment_size.is_power_of_two() {
            return Err(format!(
                "segment_size ({}) must be a power of two",
                self.cache.segment_size
            )
            .into());
        }

        let aligned = align64(self.workload.entry_size as u64);
        let limit = self.cache.segment_size.min(self.cache.size) as u64;
        if aligned > limit {
            return Err(format!(
                "entry_size ({}) rounds up to {} bytes, more than a segment or the cache can hold ({})",
                self.workload.entry_size, aligned, limit
            )
            .into());
        }

        if u32::try_from(self.workload.entry_size).is_err() {
            return Err(format!(
                "entry_size ({}) does not fit in a frame header",
                self.workload.entry_size
            )
            .into());
        }

        if self.workload.ledgers_per_thread == 0 {
            return Err("ledgers_per_thread must be at least 1".into());
        }

        if i64::try_from(self.channel.unpersisted_bytes_bound).is_err() {
            return Err("unpersisted_bytes_bound is too large".into());
        }

        Ok(())
    }
}

/// Deserialize an optional duration from a human-readable string.
fn deserialize_optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(&s)
        .map(Some)
        .map_err(serde::de::Error::custom)
}

/// Deserialize a size from a human-readable string (e.g., "1GB", "512MB", "1MB").
fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_size(&s).map_err(serde::de::Error::custom)
}

/// Parse a size string like "1GB", "512MB", "4KB" into bytes.
fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".to_string());
    }

    let num_end = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());

    let (num_str, suffix) = s.split_at(num_end);
    let num: f64 = num_str
        .parse()
        .map_err(|e| format!("invalid number '{}': {}", num_str, e))?;

    let multiplier: usize = match suffix.trim().to_uppercase().as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1024,
        "MB" | "M" => 1024 * 1024,
        "GB" | "G" => 1024 * 1024 * 1024,
        other => return Err(format!("unknown size suffix '{}'", other)),
    };

    Ok((num * multiplier as f64) as usize)
}
