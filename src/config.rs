/*!
 * Configuration types for geosync
 */

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GeoSyncError, Result};
use crate::sources::NamingScheme;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoSyncConfig {
    /// Diagnostic output settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// One entry per data source
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,
}

/// Engine tuning shared by every source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How far back Materialized records are kept, in seconds
    #[serde(default = "default_time_window_secs")]
    pub time_window_secs: u64,

    /// Transform fan-out bound (0 = one worker per CPU)
    #[serde(default)]
    pub worker_pool_width: usize,

    /// Records per Transform batch
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            time_window_secs: default_time_window_secs(),
            worker_pool_width: 0,
            chunk_size: default_chunk_size(),
        }
    }
}

impl SyncConfig {
    /// Retention window as a duration
    pub fn time_window(&self) -> Duration {
        Duration::from_secs(self.time_window_secs)
    }

    /// Worker count with auto-detection applied
    pub fn effective_pool_width(&self) -> usize {
        if self.worker_pool_width == 0 {
            crate::core::pool::detect_width()
        } else {
            self.worker_pool_width
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.time_window_secs == 0 {
            return Err(GeoSyncError::Config(
                "time_window_secs must be greater than zero".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(GeoSyncError::Config(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// One data source: where its data lives and how its artifacts are named
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique source name (e.g. "mrms")
    pub name: String,

    /// Where raw payloads are retrieved to
    pub raw_root: PathBuf,

    /// Where servable derived artifacts live
    pub derived_root: PathBuf,

    /// Naming convention used to read observation times
    #[serde(default)]
    pub naming: NamingScheme,

    /// Directory listing standing in for the upstream archive
    pub upstream_dir: PathBuf,

    /// Glob applied to upstream file names (None = everything)
    #[serde(default)]
    pub include: Option<String>,

    /// Engine tuning for this source
    #[serde(default)]
    pub sync: SyncConfig,
}

impl GeoSyncConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: GeoSyncConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Check every source and reject duplicate names
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.name.is_empty() {
                return Err(GeoSyncError::Config("source name is empty".to_string()));
            }
            if !seen.insert(source.name.as_str()) {
                return Err(GeoSyncError::Config(format!(
                    "duplicate source name: {}",
                    source.name
                )));
            }
            source.sync.validate().map_err(|e| match e {
                GeoSyncError::Config(msg) => {
                    GeoSyncError::Config(format!("{}: {}", source.name, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Find a source by name
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Starter configuration written by `geosync init-config`
    pub fn example() -> Self {
        Self {
            logging: LoggingConfig::default(),
            sources: vec![SourceConfig {
                name: "mrms".to_string(),
                raw_root: PathBuf::from("./data/raw/mrms"),
                derived_root: PathBuf::from("./tiles/mrms"),
                naming: NamingScheme::Mrms,
                upstream_dir: PathBuf::from("./upstream/mrms"),
                include: Some("*.grib2.gz".to_string()),
                sync: SyncConfig::default(),
            }],
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Default value functions for serde
fn default_time_window_secs() -> u64 {
    3600 // 1 hour
}

fn default_chunk_size() -> usize {
    4
}
