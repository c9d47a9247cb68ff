//! Configuration management for Estuary.
//!
//! Configuration is read from `~/.config/estuary/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

pub mod proxy;

pub use proxy::{ProxyConfig, ProxyKind};

use crate::fetcher::scheduler::DEFAULT_WORKERS;
use crate::retention::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub retention: RetentionPolicy,
    pub proxy: ProxyConfig,
    pub fetch: FetchConfig,
    pub update: UpdateConfig,
    pub storage: StorageConfig,
}

/// HTTP transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum concurrent requests
    pub workers: usize,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            timeout_secs: 30,
            user_agent: format!("estuary/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Automatic update behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Request an update of all feeds right after startup
    pub on_startup: bool,
    /// Periodically request an update of all feeds
    pub auto_update: bool,
    /// Period of the automatic update ("30s", "10m", "1h", "1d")
    pub interval: String,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            on_startup: false,
            auto_update: false,
            interval: "10m".to_string(),
        }
    }
}

impl UpdateConfig {
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        parse_interval(&self.interval)
            .map(Duration::from_secs)
            .map_err(ConfigError::Invalid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Durable database path; defaults to the platform data directory
    pub db_path: Option<PathBuf>,
    /// Upper bound on the final flush at shutdown
    pub shutdown_flush_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            shutdown_flush_timeout_secs: 30,
        }
    }
}

impl StorageConfig {
    pub fn shutdown_flush_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_flush_timeout_secs)
    }
}

/// Parse interval string like "1h", "30m", "6h", "1d"
pub fn parse_interval(s: &str) -> Result<u64, String> {
    let s = s.trim().to_lowercase();

    let (digits, unit) = if let Some(hours) = s.strip_suffix('h') {
        (hours, 3600)
    } else if let Some(minutes) = s.strip_suffix('m') {
        (minutes, 60)
    } else if let Some(days) = s.strip_suffix('d') {
        (days, 86400)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1)
    } else {
        (s.as_str(), 1)
    };

    let value = digits
        .parse::<u64>()
        .map_err(|_| format!("Invalid interval: {}. Use format like '1h', '30m', '1d'", s))?;
    let secs = value
        .checked_mul(unit)
        .ok_or_else(|| format!("Interval too large: {}", s))?;

    if secs == 0 {
        return Err("Interval must be greater than zero".to_string());
    }
    Ok(secs)
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(config)
    }

    /// Get the default config file path: `~/.config/estuary/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("estuary").join("config.toml"))
    }

    /// Durable database path: configured, or `<data dir>/estuary/estuary.db`.
    pub fn db_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.storage.db_path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
        let estuary_dir = data_dir.join("estuary");
        fs::create_dir_all(&estuary_dir).map_err(|e| ConfigError::Io {
            path: estuary_dir.clone(),
            source: e,
        })?;
        Ok(estuary_dir.join("estuary.db"))
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# Estuary Configuration

[retention]
# Prune items older than this many days (when day_clean_up_on)
max_day_clean_up = 30
# Keep at most this many live items per feed (when news_clean_up_on)
max_news_clean_up = 200
day_clean_up_on = true
news_clean_up_on = true
# Prune every item that has been read
read_clean_up = false
# Never prune unread items
never_unread_clean_up = true
# Never prune starred items
never_star_clean_up = true

[proxy]
# One of: none, system, http, socks5
kind = "system"
host = ""
port = 0
user = ""
password = ""

[fetch]
# Maximum concurrent requests
workers = 10
# Request timeout in seconds
timeout_secs = 30

[update]
# Update all feeds right after startup
on_startup = false
# Periodically update all feeds
auto_update = false
# Update period, e.g. "30m", "1h", "1d"
interval = "10m"

[storage]
# Database path (default: platform data directory)
# db_path = "/path/to/estuary.db"
# Maximum wait for the final flush at shutdown, in seconds
shutdown_flush_timeout_secs = 30
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Could not determine data directory")]
    NoDataDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_deserializes() {
        let content = Config::default_config_content();
        let config: Config = toml::from_str(&content).expect("Default config should be valid TOML");

        assert_eq!(config.retention, RetentionPolicy::default());
        assert_eq!(config.proxy.kind, ProxyKind::System);
        assert_eq!(config.fetch.workers, 10);
        assert_eq!(config.update.interval().unwrap(), Duration::from_secs(600));
    }

    #[test]
    fn test_partial_config() {
        let content = r##"
[retention]
max_news_clean_up = 50
read_clean_up = true
"##;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        assert_eq!(config.retention.max_news_clean_up, 50);
        assert!(config.retention.read_clean_up);
        // Defaults
        assert_eq!(config.retention.max_day_clean_up, 30);
        assert!(config.retention.never_star_clean_up);
        assert_eq!(config.storage.shutdown_flush_timeout_secs, 30);
    }

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").expect("Empty config should work");
        assert_eq!(config.retention, RetentionPolicy::default());
        assert!(!config.update.auto_update);
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[retention\nbroken").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_configured_db_path_wins() {
        let config = Config {
            storage: StorageConfig {
                db_path: Some(PathBuf::from("/tmp/custom.db")),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(config.db_path().unwrap(), PathBuf::from("/tmp/custom.db"));
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("1h").unwrap(), 3600);
        assert_eq!(parse_interval("30m").unwrap(), 1800);
        assert_eq!(parse_interval("1d").unwrap(), 86400);
        assert_eq!(parse_interval("60s").unwrap(), 60);
        assert_eq!(parse_interval("3600").unwrap(), 3600);
        assert!(parse_interval("invalid").is_err());
        assert!(parse_interval("0m").is_err());
        assert!(parse_interval("9999999999999999h").is_err());
        assert!(parse_interval("213503982334602d").is_err());
    }
}
