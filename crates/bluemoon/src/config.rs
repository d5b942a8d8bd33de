//! Configuration management for bluemoon.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "bluemoon";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "bluemoon.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `BLUEMOON_`, `__` between sections)
/// 2. TOML config file at `~/.config/bluemoon/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Billing configuration.
    pub billing: BillingConfig,
    /// Vehicle registry configuration.
    pub vehicles: VehicleConfig,
    /// Dashboard configuration.
    pub dashboard: DashboardConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
    /// Origins allowed by CORS (the admin frontend).
    pub cors_allowed_origins: Vec<String>,
    /// Page size used when a list request gives no `limit`.
    pub default_page_size: u32,
    /// Upper bound applied to any requested `limit`.
    pub max_page_size: u32,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/bluemoon/bluemoon.db`
    pub database_path: Option<PathBuf>,
    /// How long a writer waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
}

/// Billing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Day of the billing month on which invoices fall due.
    pub due_day: u32,
}

/// Vehicle registry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Regex a normalized licence plate must match.
    pub plate_pattern: String,
}

/// Dashboard configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Number of months shown in the revenue series.
    pub revenue_months: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
            cors_allowed_origins: vec!["http://localhost:3000".to_string()],
            default_page_size: 50,
            max_page_size: 500,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None, // Will be resolved to default at runtime
            busy_timeout_ms: 5_000,
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self { due_day: 15 }
    }
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            plate_pattern: default_plate_pattern(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { revenue_months: 6 }
    }
}

/// Default plate format: province code, series letters, optional digit, serial.
///
/// Matches `30A12345`, `29H1-23456`, `51LD-1234` after normalization.
fn default_plate_pattern() -> String {
    r"^[0-9]{2}[A-Z]{1,2}[0-9]?-?[0-9]{4,5}$".to_string()
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("BLUEMOON_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::ConfigValidation {
                message: "server.port must be greater than 0".to_string(),
            });
        }

        if self.server.default_page_size == 0
            || self.server.default_page_size > self.server.max_page_size
        {
            return Err(Error::ConfigValidation {
                message: format!(
                    "default_page_size ({}) must be between 1 and max_page_size ({})",
                    self.server.default_page_size, self.server.max_page_size
                ),
            });
        }

        if !(1..=28).contains(&self.billing.due_day) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "billing.due_day ({}) must be between 1 and 28",
                    self.billing.due_day
                ),
            });
        }

        if regex::Regex::new(&self.vehicles.plate_pattern).is_err() {
            return Err(Error::ConfigValidation {
                message: format!(
                    "invalid regex pattern: {}",
                    self.vehicles.plate_pattern
                ),
            });
        }

        if self.dashboard.revenue_months == 0 {
            return Err(Error::ConfigValidation {
                message: "dashboard.revenue_months must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the socket address the server listens on.
    ///
    /// # Errors
    ///
    /// Returns an error if `server.bind` is not an IP address.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.bind, self.server.port)
            .parse()
            .map_err(|_| Error::ConfigValidation {
                message: format!("invalid bind address: {}", self.server.bind),
            })
    }

    /// Get the busy timeout as a Duration.
    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.billing.due_day, 15);
        assert_eq!(config.dashboard.revenue_months, 6);
        assert!(config.storage.database_path.is_none());
    }

    #[test]
    fn test_default_server_config() {
        let server = ServerConfig::default();

        assert_eq!(server.bind, "127.0.0.1");
        assert_eq!(server.default_page_size, 50);
        assert_eq!(server.max_page_size, 500);
        assert_eq!(server.cors_allowed_origins, vec!["http://localhost:3000"]);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("server.port"));
    }

    #[test]
    fn test_validate_page_sizes() {
        let mut config = Config::default();
        config.server.default_page_size = 1000;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("default_page_size"));
    }

    #[test]
    fn test_validate_due_day_range() {
        let mut config = Config::default();
        config.billing.due_day = 31;
        assert!(config.validate().is_err());

        config.billing.due_day = 0;
        assert!(config.validate().is_err());

        config.billing.due_day = 28;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_plate_regex() {
        let mut config = Config::default();
        config.vehicles.plate_pattern = "[invalid".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("invalid regex"));
    }

    #[test]
    fn test_default_plate_pattern_matches_common_plates() {
        let re = regex::Regex::new(&default_plate_pattern()).unwrap();
        assert!(re.is_match("30A12345"));
        assert!(re.is_match("29H1-23456"));
        assert!(re.is_match("51LD-1234"));
        assert!(!re.is_match("HELLO"));
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        let path = config.database_path();

        assert!(path.to_string_lossy().contains("bluemoon.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/srv/bluemoon/data.db"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/srv/bluemoon/data.db")
        );
    }

    #[test]
    fn test_listen_addr() {
        let config = Config::default();
        assert_eq!(
            config.listen_addr().unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_listen_addr_invalid_bind() {
        let mut config = Config::default();
        config.server.bind = "not an address".to_string();
        assert!(config.listen_addr().is_err());
    }

    #[test]
    fn test_busy_timeout() {
        let config = Config::default();
        assert_eq!(config.busy_timeout(), Duration::from_millis(5_000));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("bluemoon"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        // Loading from a nonexistent path should work (uses defaults)
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());

        let config = result.unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_toml_file_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let toml = "[server]\nport = 9000\n\n[billing]\ndue_day = 5\n\n\
                    [dashboard]\nrevenue_months = 12\n";
        std::fs::write(&path, toml).unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.billing.due_day, 5);
        assert_eq!(config.dashboard.revenue_months, 12);
    }

    #[test]
    fn test_load_invalid_toml_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[billing]\ndue_day = 31\n").unwrap();

        assert!(Config::load_from(Some(path)).is_err());
    }

    #[test]
    fn test_billing_config_deserialize() {
        let json = r#"{"due_day": 10}"#;
        let billing: BillingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(billing.due_day, 10);
    }

    #[test]
    fn test_server_config_partial_deserialize() {
        let json = r#"{"port": 9000}"#;
        let server: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(server.port, 9000);
        assert_eq!(server.bind, "127.0.0.1");
    }
}
