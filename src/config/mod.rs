//! Configuration module for Kata Uploadr
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation. Every section is optional;
//! a missing file section falls back to its defaults.

use crate::upload::planner::DeviceClass;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
pub(crate) fn expand_env_vars(s: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") else {
        return s.to_string();
    };
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        // Append the text before the match
        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);
    result
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: EndpointConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub resume: ResumeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_http_url(&self.backend.base_url) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid backend base_url '{}': must start with http:// or https://",
                self.backend.base_url
            )));
        }
        if self.backend.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "backend.request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.upload.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "upload.concurrency must be at least 1".into(),
            ));
        }
        if self.upload.part_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "upload.part_timeout_secs must be greater than 0".into(),
            ));
        }

        let retry = &self.upload.retry;
        if retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "upload.retry.max_attempts must be at least 1".into(),
            ));
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            return Err(ConfigError::ValidationError(format!(
                "upload.retry.base_delay_ms ({}) exceeds max_delay_ms ({})",
                retry.base_delay_ms, retry.max_delay_ms
            )));
        }

        if self.resume.namespace.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "resume.namespace cannot be empty".into(),
            ));
        }
        if self.resume.ttl_hours == 0 {
            return Err(ConfigError::ValidationError(
                "resume.ttl_hours must be greater than 0".into(),
            ));
        }

        match self.logging.level.to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level '{}': must be one of trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        Ok(())
    }
}

/// Upload service configuration (`backend` section)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl From<&EndpointConfig> for crate::backend::BackendConfig {
    fn from(config: &EndpointConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000/api/uploads".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bearer token; usually `${KATA_UPLOAD_TOKEN}`
    #[serde(default)]
    pub token: Option<String>,
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_part_timeout_secs")]
    pub part_timeout_secs: u64,
    #[serde(default)]
    pub device_class: DeviceClass,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            part_timeout_secs: default_part_timeout_secs(),
            device_class: DeviceClass::default(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_part_timeout_secs() -> u64 {
    60
}

/// Per-part retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    8000
}

/// Resume store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeConfig {
    /// Directory of the file store; defaults to a per-user cache directory
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            directory: None,
            namespace: default_namespace(),
            ttl_hours: default_ttl_hours(),
        }
    }
}

impl ResumeConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours * 60 * 60)
    }

    /// Configured directory, else `$HOME/.cache/kata-uploadr`, else the temp dir
    pub fn resolved_directory(&self) -> PathBuf {
        if let Some(dir) = &self.directory {
            return dir.clone();
        }
        match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(".cache").join("kata-uploadr"),
            None => std::env::temp_dir().join("kata-uploadr"),
        }
    }
}

fn default_namespace() -> String {
    crate::resume::DEFAULT_NAMESPACE.to_string()
}

fn default_ttl_hours() -> u64 {
    24
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
