//! Configuration loading and validation for the sitewatch server

use crate::types::ServerConfig;
use serde::{Deserialize, Serialize};
use sitewatch::MonitorConfig;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV: &str = "SITEWATCH_CONFIG";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub monitor: MonitorSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub certs: CertSettings,

    #[serde(default)]
    pub metrics: MetricsSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        self.server.validate()?;
        self.monitor.validate()?;
        self.storage.validate()?;
        self.certs.validate()?;
        Ok(())
    }
}

/// API listener settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerSettings {
    #[validate(custom = "validate_listen_addr")]
    pub listen_addr: String,
}

/// Check cadence settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MonitorSettings {
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_interval")]
    pub interval: Duration,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_request_timeout")]
    pub request_timeout: Duration,
}

/// Durable store settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StorageSettings {
    #[validate(length(min = 1))]
    pub path: String,

    #[validate(range(min = 16, max = 100000))]
    pub queue_size: usize,
}

/// Uploaded certificate settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CertSettings {
    #[validate(length(min = 1))]
    pub dir: String,

    #[validate(range(min = 1, max = 52428800))]
    pub max_upload_bytes: usize,
}

/// Metrics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

// Default implementations

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5000".to_string(),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        let defaults = MonitorConfig::default();
        Self {
            interval: defaults.interval,
            request_timeout: defaults.request_timeout,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: "websites.db".to_string(),
            queue_size: 1024,
        }
    }
}

impl Default for CertSettings {
    fn default() -> Self {
        Self {
            dir: "./certs".to_string(),
            max_upload_bytes: 5 << 20,
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// Custom validators

fn validate_listen_addr(addr: &str) -> Result<(), ValidationError> {
    addr.trim()
        .parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("listen_addr_invalid"))
}

fn validate_interval(interval: &Duration) -> Result<(), ValidationError> {
    if *interval < Duration::from_secs(1) || *interval > Duration::from_secs(24 * 60 * 60) {
        return Err(ValidationError::new("interval_out_of_range"));
    }
    Ok(())
}

fn validate_request_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    if *timeout < Duration::from_secs(1) || *timeout > Duration::from_secs(10 * 60) {
        return Err(ValidationError::new("request_timeout_out_of_range"));
    }
    Ok(())
}

// Configuration loading implementation

impl Config {
    /// Load configuration from `SITEWATCH_CONFIG` or the default search paths
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(explicit) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(explicit);
            if !path.is_file() {
                return Err(ConfigError::FileNotFound(path));
            }
            tracing::info!("Loading configuration from: {}", path.display());
            return Self::load_from_file(&path);
        }

        match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/sitewatch/sitewatch.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./sitewatch.yaml"));

        paths.into_iter().find(|p: &PathBuf| p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/sitewatch/sitewatch.yaml"))
    }

    /// Flatten into the internal ServerConfig
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            listen_addr: self.server.listen_addr.trim().to_string(),
            monitor: MonitorConfig {
                interval: self.monitor.interval,
                request_timeout: self.monitor.request_timeout,
            },
            store_path: PathBuf::from(&self.storage.path),
            store_queue_size: self.storage.queue_size,
            certs_dir: PathBuf::from(&self.certs.dir),
            max_upload_bytes: self.certs.max_upload_bytes,
            metrics_enabled: self.metrics.enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_valid_yaml_parsing() {
        let yaml = r#"
server:
  listen_addr: "127.0.0.1:8080"

monitor:
  interval: 10m
  request_timeout: 15s

storage:
  path: "/var/lib/sitewatch/targets.db"
  queue_size: 256

certs:
  dir: "/var/lib/sitewatch/certs"
  max_upload_bytes: 1048576

metrics:
  enabled: false

logging:
  level: debug
  format: json
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.monitor.interval, Duration::from_secs(600));
        assert_eq!(config.monitor.request_timeout, Duration::from_secs(15));
        assert_eq!(config.storage.queue_size, 256);
        assert!(!config.metrics.enabled);
        assert_eq!(config.logging.format.as_deref(), Some("json"));
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = r#"
server:
  listen_addr: "127.0.0.1:9000"
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.monitor.interval, Duration::from_secs(300));
        assert_eq!(config.monitor.request_timeout, Duration::from_secs(30));
        assert_eq!(config.storage.path, "websites.db");
        assert_eq!(config.certs.max_upload_bytes, 5 * 1024 * 1024);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_partial_section_fills_missing_fields() {
        let yaml = r#"
monitor:
  interval: 1m
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.monitor.interval, Duration::from_secs(60));
        assert_eq!(config.monitor.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_interval() {
        let yaml = r#"
monitor:
  interval: 500ms  # Invalid: < 1s
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());

        let yaml = r#"
monitor:
  interval: 2days  # Invalid: > 24h
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_request_timeout() {
        let yaml = r#"
monitor:
  request_timeout: 1h  # Invalid: > 10m
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_queue_size() {
        let yaml = r#"
storage:
  path: "websites.db"
  queue_size: 4  # Invalid: < 16
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_listen_addr_validation() {
        assert!(validate_listen_addr("0.0.0.0:5000").is_ok());
        assert!(validate_listen_addr("[::1]:8080").is_ok());
        assert!(validate_listen_addr(" 127.0.0.1:80 ").is_ok());

        assert!(validate_listen_addr("").is_err());
        assert!(validate_listen_addr("localhost").is_err());
        assert!(validate_listen_addr("127.0.0.1").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sitewatch.yaml");
        std::fs::write(&path, "storage:\n  path: \"/tmp/sw.db\"\n  queue_size: 64\n").unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.storage.path, "/tmp/sw.db");
        assert_eq!(config.storage.queue_size, 64);
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = Config::load_from_file("/nonexistent/sitewatch.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[test]
    fn test_config_to_server_config_conversion() {
        let config = Config::default();
        let server_config = config.to_server_config();

        assert_eq!(server_config.listen_addr, "0.0.0.0:5000");
        assert_eq!(server_config.monitor, MonitorConfig::default());
        assert_eq!(server_config.store_path, PathBuf::from("websites.db"));
        assert_eq!(server_config.store_queue_size, 1024);
        assert_eq!(server_config.certs_dir, PathBuf::from("./certs"));
        assert!(server_config.metrics_enabled);
    }
}
