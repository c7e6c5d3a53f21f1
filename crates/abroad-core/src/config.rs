//! Abroad Configuration Management
//!
//! Handles configuration from environment variables and TOML files
//! with sensible defaults for local development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Backend API configuration
    pub api: ApiConfig,

    /// Session lifecycle configuration
    pub session: SessionConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Backend
        if let Ok(url) = std::env::var("ABROAD_API_URL") {
            config.api.base_url = url;
        }
        if let Ok(secs) = std::env::var("ABROAD_API_TIMEOUT_SECS") {
            config.api.timeout_secs = parse_env("ABROAD_API_TIMEOUT_SECS", secs)?;
        }

        // Session
        if let Ok(path) = std::env::var("ABROAD_SESSION_FILE") {
            config.session.storage_path = PathBuf::from(path);
        }
        if let Ok(secs) = std::env::var("ABROAD_REFRESH_INTERVAL_SECS") {
            config.session.refresh_interval_secs =
                parse_env("ABROAD_REFRESH_INTERVAL_SECS", secs)?;
        }
        if let Ok(secs) = std::env::var("ABROAD_REFRESH_THRESHOLD_SECS") {
            config.session.refresh_threshold_secs =
                parse_env("ABROAD_REFRESH_THRESHOLD_SECS", secs)?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = std::env::var("LOG_JSON") {
            config.logging.json_format = parse_env("LOG_JSON", json)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;

        // Only override if env values differ from defaults
        if env_config.api.base_url != ApiConfig::default().base_url {
            self.api.base_url = env_config.api.base_url;
        }
        if env_config.api.timeout_secs != ApiConfig::default().timeout_secs {
            self.api.timeout_secs = env_config.api.timeout_secs;
        }
        if env_config.session.storage_path != SessionConfig::default().storage_path {
            self.session.storage_path = env_config.session.storage_path;
        }
        if env_config.session.refresh_interval_secs
            != SessionConfig::default().refresh_interval_secs
        {
            self.session.refresh_interval_secs = env_config.session.refresh_interval_secs;
        }
        if env_config.session.refresh_threshold_secs
            != SessionConfig::default().refresh_threshold_secs
        {
            self.session.refresh_threshold_secs = env_config.session.refresh_threshold_secs;
        }
        if env_config.logging.level != LoggingConfig::default().level {
            self.logging.level = env_config.logging.level;
        }
        if env_config.logging.json_format {
            self.logging.json_format = true;
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired("api.base_url".to_string()));
        }
        if self.session.refresh_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "session.refresh_interval_secs".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the backend (without the `/api/...` prefix)
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// User agent sent with every request
    pub user_agent: String,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
            user_agent: concat!("abroad/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// File holding the persisted session
    pub storage_path: PathBuf,

    /// How often the refresh monitor checks the token
    pub refresh_interval_secs: u64,

    /// Refresh once the token has less than this much lifetime left
    pub refresh_threshold_secs: u64,

    /// Run the background refresh monitor
    pub monitor_enabled: bool,
}

impl SessionConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.refresh_threshold_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        let base = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            storage_path: base.join(".abroad").join("session.json"),
            refresh_interval_secs: 5 * 60,   // 5 minutes
            refresh_threshold_secs: 10 * 60, // 10 minutes
            monitor_enabled: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
