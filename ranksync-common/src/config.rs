//! Bootstrap configuration
//!
//! Loaded once at startup from a TOML file. Priority (highest first):
//! 1. Command-line argument / environment variable (applied by the binary)
//! 2. TOML config file
//! 3. Compiled defaults
//!
//! A missing config file is not an error: the service logs a warning and
//! runs on defaults.

use crate::catalog::SourceKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "RANKSYNC_CONFIG";

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// SQLite catalog database path
    pub database_path: PathBuf,
    /// Health endpoint bind host
    pub listen_host: String,
    /// Health endpoint port
    pub listen_port: u16,
    pub logging: LoggingConfig,
    pub scheduler: SchedulerConfig,
    pub sources: SourcesConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            listen_host: "127.0.0.1".to_string(),
            listen_port: 3031,
            logging: LoggingConfig::default(),
            scheduler: SchedulerConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive (overridden by `RUST_LOG`)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Timing of the per-source sync loops
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub qualified_initial_delay_secs: u64,
    pub ranked_initial_delay_secs: u64,
    pub interval_secs: u64,
    /// Attempts per transaction when SQLite reports lock contention
    pub max_conflict_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            qualified_initial_delay_secs: 240,
            ranked_initial_delay_secs: 300,
            interval_secs: 3600,
            max_conflict_retries: 3,
        }
    }
}

impl SchedulerConfig {
    pub fn qualified_initial_delay(&self) -> Duration {
        Duration::from_secs(self.qualified_initial_delay_secs)
    }

    pub fn ranked_initial_delay(&self) -> Duration {
        Duration::from_secs(self.ranked_initial_delay_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Per-service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub scoresaber: SourceConfig,
    pub beatleader: SourceConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            scoresaber: SourceConfig::with_base_url("https://scoresaber.com"),
            beatleader: SourceConfig::with_base_url("https://api.beatleader.com"),
        }
    }
}

impl SourcesConfig {
    pub fn for_source(&self, kind: SourceKind) -> &SourceConfig {
        match kind {
            SourceKind::ScoreSaber => &self.scoresaber,
            SourceKind::BeatLeader => &self.beatleader,
        }
    }
}

/// Connection and paging settings for one ranking service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub enabled: bool,
    pub base_url: String,
    pub page_size: u32,
    /// Pause between consecutive page requests
    pub page_delay_ms: u64,
    /// Hard stop for runaway pagination
    pub max_pages: u32,
    pub requests_per_second: u32,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl SourceConfig {
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            ..Self::default()
        }
    }

    pub fn page_delay(&self) -> Duration {
        crate::time::millis_to_duration(self.page_delay_ms)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: String::new(),
            page_size: 20,
            page_delay_ms: 20,
            max_pages: 1000,
            requests_per_second: 10,
            connect_timeout_secs: 30,
            request_timeout_secs: 60,
        }
    }
}

impl ServiceConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ServiceConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or spin the sync loops
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.interval_secs == 0 {
            return Err(Error::Config("scheduler.interval_secs must be > 0".to_string()));
        }
        if self.scheduler.max_conflict_retries == 0 {
            return Err(Error::Config(
                "scheduler.max_conflict_retries must be > 0".to_string(),
            ));
        }
        for kind in SourceKind::ALL {
            let name = kind.as_str();
            let source = self.sources.for_source(kind);
            if source.page_size == 0 {
                return Err(Error::Config(format!("sources.{}.page_size must be > 0", name)));
            }
            if source.max_pages == 0 {
                return Err(Error::Config(format!("sources.{}.max_pages must be > 0", name)));
            }
            if source.requests_per_second == 0 {
                return Err(Error::Config(format!(
                    "sources.{}.requests_per_second must be > 0",
                    name
                )));
            }
            if source.enabled && source.base_url.trim().is_empty() {
                return Err(Error::Config(format!("sources.{}.base_url is empty", name)));
            }
        }
        Ok(())
    }
}

/// Load configuration
///
/// An explicit path must exist. Without one, the platform config file is
/// used when present, otherwise compiled defaults.
pub fn load_config(explicit_path: Option<&Path>) -> Result<ServiceConfig> {
    let path = match explicit_path {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => {
                warn!("No config file found, using compiled defaults");
                return Ok(ServiceConfig::default());
            }
        },
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = ServiceConfig::from_toml_str(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// `~/.config/ranksync/config.toml` (or the platform equivalent)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ranksync").join("config.toml"))
}

/// `~/.local/share/ranksync/catalog.db` (or the platform equivalent)
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("ranksync"))
        .unwrap_or_else(|| PathBuf::from("./ranksync_data"))
        .join("catalog.db")
}
