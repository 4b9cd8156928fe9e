//! Store configuration.
//!
//! Configuration is loaded from environment variables with defaults suitable
//! for tests and local development (an in-memory SQLite database).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },

    /// The database URL names a backend this build does not support.
    #[error("Unsupported database URL: {0}")]
    UnsupportedUrl(String),
}

/// Database backend selected by the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlScheme {
    /// `sqlite:` URLs.
    Sqlite,
    /// `postgres:` / `postgresql:` URLs.
    Postgres,
}

/// Connection settings for a [`Store`](crate::store::Store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database URL (`sqlite::memory:`, `sqlite://app.db`, `postgres://...`).
    pub database_url: String,

    /// Maximum pool connections. In-memory SQLite always uses one.
    pub max_connections: u32,

    /// Timeout for acquiring a connection, in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for StoreConfig {
    /// Returns an in-memory SQLite configuration.
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 5,
            connect_timeout_secs: 30,
        }
    }
}

impl StoreConfig {
    /// Configuration for the given URL with default pool settings.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ABILITY_DATABASE_URL`: database URL (default: sqlite::memory:)
    /// - `ABILITY_DB_MAX_CONNECTIONS`: pool size (default: 5)
    /// - `ABILITY_DB_CONNECT_TIMEOUT_SECS`: acquire timeout (default: 30)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            database_url: std::env::var("ABILITY_DATABASE_URL").unwrap_or(default.database_url),
            max_connections: std::env::var("ABILITY_DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.max_connections),
            connect_timeout_secs: std::env::var("ABILITY_DB_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.connect_timeout_secs),
        }
    }

    /// The backend named by the URL scheme.
    pub fn scheme(&self) -> Result<UrlScheme, ConfigError> {
        let url = self.database_url.as_str();
        if url.starts_with("sqlite:") {
            Ok(UrlScheme::Sqlite)
        } else if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            Ok(UrlScheme::Postgres)
        } else {
            Err(ConfigError::UnsupportedUrl(url.to_string()))
        }
    }

    /// Check if the URL points at an in-memory SQLite database.
    pub fn is_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    /// Pool size after applying the in-memory restriction.
    pub fn pool_size(&self) -> u32 {
        if self.is_memory() {
            1
        } else {
            self.max_connections
        }
    }

    /// Get the acquire timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheme()?;
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ABILITY_DB_MAX_CONNECTIONS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ABILITY_DB_CONNECT_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert!(config.is_memory());
        assert_eq!(config.pool_size(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scheme() {
        assert_eq!(StoreConfig::new("sqlite://app.db").scheme().unwrap(), UrlScheme::Sqlite);
        assert_eq!(
            StoreConfig::new("postgresql://localhost/app").scheme().unwrap(),
            UrlScheme::Postgres
        );
        assert!(matches!(
            StoreConfig::new("mysql://localhost/app").scheme(),
            Err(ConfigError::UnsupportedUrl(_))
        ));
    }

    #[test]
    fn test_file_database_keeps_pool_size() {
        let config = StoreConfig {
            max_connections: 8,
            ..StoreConfig::new("sqlite://app.db")
        };
        assert!(!config.is_memory());
        assert_eq!(config.pool_size(), 8);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = StoreConfig {
            max_connections: 0,
            ..StoreConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "ABILITY_DB_MAX_CONNECTIONS"
        ));
    }
}
