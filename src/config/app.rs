//! Main application configuration
//!
//! This module defines the configuration structures for the tictac-parlor
//! game service, including file and environment variable loading and
//! validation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub session: SessionSettings,
    pub persistence: PersistenceSettings,
}

/// Service-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for the HTTP server (WebSocket, health and metrics)
    pub http_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
    /// Outbound event buffer per connection
    pub connection_buffer_size: usize,
}

/// Session lifecycle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Idle time after which a session is abandoned
    pub idle_timeout_seconds: u64,
    /// How often the idle reaper runs
    pub reaper_interval_seconds: u64,
    /// Fixed seed for symbol assignment; random when unset
    pub symbol_seed: Option<u64>,
}

/// Session store writer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    /// Retries after the first failed save
    pub max_retries: u32,
    /// Initial retry delay in milliseconds, doubled on each retry
    pub retry_delay_ms: u64,
    /// Upper bound for the retry delay in milliseconds
    pub max_retry_delay_ms: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "tictac-parlor".to_string(),
            log_level: "info".to_string(),
            http_port: 3000,
            shutdown_timeout_seconds: 30,
            connection_buffer_size: 64,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: 600,   // 10 minutes
            reaper_interval_seconds: 30, // 30 seconds
            symbol_seed: None,
        }
    }
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 500,
            max_retry_delay_ms: 5000,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Invalid {} value: {}", name, value)),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Parse configuration from TOML text; missing keys keep their defaults
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Some(port) = parse_env("HTTP_PORT")? {
            self.service.http_port = port;
        }
        if let Some(timeout) = parse_env("SHUTDOWN_TIMEOUT_SECONDS")? {
            self.service.shutdown_timeout_seconds = timeout;
        }
        if let Some(buffer) = parse_env("CONNECTION_BUFFER_SIZE")? {
            self.service.connection_buffer_size = buffer;
        }

        // Session settings
        if let Some(timeout) = parse_env("SESSION_IDLE_TIMEOUT_SECONDS")? {
            self.session.idle_timeout_seconds = timeout;
        }
        if let Some(interval) = parse_env("REAPER_INTERVAL_SECONDS")? {
            self.session.reaper_interval_seconds = interval;
        }
        if let Some(seed) = parse_env("SYMBOL_SEED")? {
            self.session.symbol_seed = Some(seed);
        }

        // Persistence settings
        if let Some(retries) = parse_env("PERSISTENCE_MAX_RETRIES")? {
            self.persistence.max_retries = retries;
        }
        if let Some(delay) = parse_env("PERSISTENCE_RETRY_DELAY_MS")? {
            self.persistence.retry_delay_ms = delay;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get reaper interval as Duration
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.session.reaper_interval_seconds)
    }
}

impl SessionSettings {
    /// Idle timeout as a chrono duration, for comparisons against timestamps
    pub fn idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.idle_timeout_seconds as i64)
    }
}

impl PersistenceSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.http_port == 0 {
        return Err(anyhow!("HTTP port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.service.connection_buffer_size == 0 {
        return Err(anyhow!("Connection buffer size must be greater than 0"));
    }

    // Validate session settings
    if config.session.idle_timeout_seconds == 0 {
        return Err(anyhow!("Session idle timeout must be greater than 0"));
    }
    if config.session.reaper_interval_seconds == 0 {
        return Err(anyhow!("Reaper interval must be greater than 0"));
    }

    // Validate persistence settings
    if config.persistence.retry_delay_ms > config.persistence.max_retry_delay_ms {
        return Err(anyhow!(
            "Persistence retry delay ({}ms) exceeds max retry delay ({}ms)",
            config.persistence.retry_delay_ms,
            config.persistence.max_retry_delay_ms
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.service.http_port, 3000);
        assert_eq!(config.session.idle_timeout_seconds, 600);
        assert_eq!(config.session.idle_timeout(), chrono::Duration::minutes(10));
        assert_eq!(config.reaper_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [service]
            http_port = 8088

            [session]
            idle_timeout_seconds = 120
            symbol_seed = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.service.http_port, 8088);
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.session.idle_timeout_seconds, 120);
        assert_eq!(config.session.symbol_seed, Some(7));
        assert_eq!(config.persistence, PersistenceSettings::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.service.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.session.reaper_interval_seconds = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.persistence.retry_delay_ms = 10_000;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        assert!(AppConfig::from_toml_str("[service\nhttp_port = ").is_err());
    }
}
