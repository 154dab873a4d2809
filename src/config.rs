/// Configuration for the substrate crate.
///
/// - Environment-based overrides (`SUBSTRATE_*`)
/// - TOML file support
/// - Runtime validation

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use crate::crypto::Algorithm;
use crate::error::{CoreError, Result};

/// Top-level configuration, loaded once at process startup and threaded
/// through to the repositories, key manager and projection runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
    pub projection: ProjectionConfig,
    pub logging: LoggingConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            crypto: CryptoConfig::default(),
            projection: ProjectionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Postgres connection pool settings for the event log and supporting
/// stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/substrate".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
        }
    }
}

/// Default envelope-crypto parameters. Per-partition/type/stream policy
/// overrides are resolved at runtime by the policy resolver; these are
/// only the fallback used when no policy has been registered yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoConfig {
    pub default_algorithm: Algorithm,
    pub key_cache_ttl_secs: u64,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            default_algorithm: Algorithm::AesGcm,
            key_cache_ttl_secs: 300,
        }
    }
}

/// Consumer/runner batch and polling defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    pub batch_size: usize,
    pub polling_interval_ms: u64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            polling_interval_ms: 500,
        }
    }
}

/// Logging configuration, consumed by the binary/test harness to set up
/// `tracing-subscriber`; the library itself only emits `tracing` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl CoreConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| CoreError::ConfigError(format!("failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| CoreError::ConfigError(format!("invalid config format: {}", e)))
    }

    /// Override with `SUBSTRATE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = CoreConfig::default();

        if let Ok(url) = std::env::var("SUBSTRATE_DATABASE_URL") {
            config.storage.database_url = url;
        }
        if let Ok(n) = std::env::var("SUBSTRATE_MAX_CONNECTIONS") {
            config.storage.max_connections = n
                .parse()
                .map_err(|_| CoreError::ConfigError("invalid SUBSTRATE_MAX_CONNECTIONS".to_string()))?;
        }
        if let Ok(n) = std::env::var("SUBSTRATE_BATCH_SIZE") {
            config.projection.batch_size = n
                .parse()
                .map_err(|_| CoreError::ConfigError("invalid SUBSTRATE_BATCH_SIZE".to_string()))?;
        }

        Ok(config)
    }

    /// Load with fallback priority: config file, then environment
    /// overrides, then defaults.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = config_path {
            if path.exists() {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_file(path)?
            } else {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                CoreConfig::default()
            }
        } else {
            CoreConfig::default()
        };

        if let Ok(env_config) = Self::from_env() {
            config.merge_env(env_config);
        }

        config.validate()?;
        Ok(config)
    }

    fn merge_env(&mut self, env_config: CoreConfig) {
        if env_config.storage.database_url != StorageConfig::default().database_url {
            self.storage.database_url = env_config.storage.database_url;
        }
        if env_config.storage.max_connections != StorageConfig::default().max_connections {
            self.storage.max_connections = env_config.storage.max_connections;
        }
        if env_config.projection.batch_size != ProjectionConfig::default().batch_size {
            self.projection.batch_size = env_config.projection.batch_size;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.database_url.is_empty() {
            return Err(CoreError::ConfigError("database_url cannot be empty".to_string()));
        }
        if self.storage.max_connections == 0 {
            return Err(CoreError::ConfigError("max_connections cannot be 0".to_string()));
        }
        if self.projection.batch_size == 0 {
            return Err(CoreError::ConfigError("projection.batch_size cannot be 0".to_string()));
        }
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| CoreError::ConfigError(format!("failed to serialize config: {}", e)))?;
        fs::write(path.as_ref(), toml)
            .map_err(|e| CoreError::ConfigError(format!("failed to write config file: {}", e)))?;
        Ok(())
    }

    pub fn example() -> String {
        toml::to_string_pretty(&CoreConfig::default())
            .unwrap_or_else(|_| String::from("# failed to generate example config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoreConfig::default();
        assert_eq!(config.storage.max_connections, 10);
        assert_eq!(config.projection.batch_size, 100);
    }

    #[test]
    fn test_config_validation() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_max_connections() {
        let mut config = CoreConfig::default();
        config.storage.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = CoreConfig::default();
        let toml = toml::to_string(&config).unwrap();
        let deserialized: CoreConfig = toml::from_str(&toml).unwrap();
        assert_eq!(config.storage.max_connections, deserialized.storage.max_connections);
    }
}
