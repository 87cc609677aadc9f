//! Application configuration structures.

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveLimits;
use crate::collector::DEFAULT_COLLECTOR_TIMEOUT;
use crate::collector::files::FileCollectorConfig;
use crate::scheduler::DEFAULT_CONFIG_POLL;
use crate::uploader::DEFAULT_UPLOAD_TIMEOUT;

use super::validation::ConfigError;

// =============================================================================
// Constants
// =============================================================================

/// Default directory holding the support bundle.
pub const DEFAULT_SUPPORT_PATH: &str = "/var/run/secrets/support";

/// Default directory for recorded archives.
pub const DEFAULT_STORAGE_PATH: &str = "/var/lib/insights-operator";

/// Default number of archives kept on disk.
pub const DEFAULT_RETAIN: usize = 8;

fn default_retain() -> usize {
    DEFAULT_RETAIN
}

fn default_collector_timeout() -> Duration {
    DEFAULT_COLLECTOR_TIMEOUT
}

fn default_upload_timeout() -> Duration {
    DEFAULT_UPLOAD_TIMEOUT
}

fn default_config_poll() -> Duration {
    DEFAULT_CONFIG_POLL
}

fn default_max_records() -> usize {
    ArchiveLimits::default().max_records
}

fn default_max_bytes() -> usize {
    ArchiveLimits::default().max_bytes
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Status server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 8080).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

// =============================================================================
// Support / Storage / Gather Configuration
// =============================================================================

/// Where the support bundle is mounted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportSourceConfig {
    /// Directory with one file per key (default: "/var/run/secrets/support").
    pub path: String,
}

impl Default for SupportSourceConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_SUPPORT_PATH.to_string(),
        }
    }
}

/// Local archive storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory receiving `insights-*.tar.gz` files.
    #[serde(default = "default_storage_path")]
    pub path: String,

    /// Number of newest archives kept on disk (default: 8).
    #[serde(default = "default_retain")]
    pub retain: usize,
}

fn default_storage_path() -> String {
    DEFAULT_STORAGE_PATH.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            retain: DEFAULT_RETAIN,
        }
    }
}

/// Gather cycle limits and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatherConfig {
    /// Timeout for each collector (default: 1m).
    #[serde(default = "default_collector_timeout", with = "humantime_serde")]
    pub collector_timeout: Duration,

    /// Timeout for each upload (default: 1m).
    #[serde(default = "default_upload_timeout", with = "humantime_serde")]
    pub upload_timeout: Duration,

    /// How often the support bundle is re-read between cycles (default: 30s).
    #[serde(default = "default_config_poll", with = "humantime_serde")]
    pub config_poll: Duration,

    /// Maximum records per archive.
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// Maximum uncompressed bytes per archive.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for GatherConfig {
    fn default() -> Self {
        Self {
            collector_timeout: DEFAULT_COLLECTOR_TIMEOUT,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            config_poll: DEFAULT_CONFIG_POLL,
            max_records: default_max_records(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl GatherConfig {
    pub fn limits(&self) -> ArchiveLimits {
        ArchiveLimits {
            max_records: self.max_records,
            max_bytes: self.max_bytes,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Status server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Support bundle location.
    #[serde(default)]
    pub support: SupportSourceConfig,

    /// Archive storage.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Gather limits and timeouts.
    #[serde(default)]
    pub gather: GatherConfig,

    /// File-based collectors.
    #[serde(default)]
    pub collectors: Vec<FileCollectorConfig>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, using defaults when the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match Self::load(path.as_ref()) {
            Err(ConfigError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.as_ref().display(),
                    "Configuration file not found, using defaults"
                );
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        if self.storage.retain == 0 {
            return Err(ConfigError::ValidationError(
                "storage retain must be positive".to_string(),
            ));
        }

        if self.gather.collector_timeout.is_zero()
            || self.gather.upload_timeout.is_zero()
            || self.gather.config_poll.is_zero()
        {
            return Err(ConfigError::ValidationError(
                "gather timeouts must be positive".to_string(),
            ));
        }

        if self.gather.max_records == 0 || self.gather.max_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "gather limits must be positive".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for collector in &self.collectors {
            collector.validate()?;
            if !names.insert(collector.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate collector name: '{}'",
                    collector.name
                )));
            }
        }

        Ok(())
    }
}
