//! Configuration management for the automation agent.
//!
//! Configuration can be set via environment variables:
//! - `AIPROXY_TOKEN` - Required. Bearer token for the OpenAI-compatible proxy.
//! - `AIPROXY_URL` - Optional. Proxy base URL. Defaults to `https://aiproxy.sanand.workers.dev/openai/v1`.
//! - `CLASSIFIER_MODEL` - Optional. Chat model used for classification and vision. Defaults to `gpt-4o-mini`.
//! - `EMBEDDING_MODEL` - Optional. Embedding model. Defaults to `text-embedding-3-small`.
//! - `DATA_ROOT` - Optional. Directory every managed path must stay under. Defaults to `/data`.
//! - `HOST` - Optional. Server host. Defaults to `0.0.0.0`.
//! - `PORT` - Optional. Server port. Defaults to `8000`.
//! - `CLASSIFIER_TIMEOUT_SECS` - Optional. Per-attempt timeout for proxy calls. Defaults to `20`.
//! - `CLASSIFIER_MAX_RETRIES` - Optional. Retries after a transient proxy failure. Defaults to `2`.
//! - `COMMAND_TIMEOUT_SECS` - Optional. Timeout for subprocess-backed tasks. Defaults to `120`.
//! - `DATAGEN_SCRIPT_URL` - Optional. Script run by the `generate_data` task.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PROXY_URL: &str = "https://aiproxy.sanand.workers.dev/openai/v1";

pub const DEFAULT_DATAGEN_SCRIPT_URL: &str = "https://raw.githubusercontent.com/sanand0/tools-in-data-science-public/tds-2025-01/project-1/datagen.py";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Retry policy for calls to the model proxy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum backoff cap.
    pub max_delay: Duration,
    /// Multiplier per consecutive failure (typically 2.0).
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(retry as i32);
        let capped = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bearer token for the model proxy
    pub api_token: String,

    /// Base URL of the OpenAI-compatible proxy (without the endpoint path)
    pub proxy_url: String,

    /// Chat model used for classification and image extraction
    pub classifier_model: String,

    /// Embedding model used by the comment similarity task
    pub embedding_model: String,

    /// Directory all managed file paths are confined to
    pub data_root: PathBuf,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Per-attempt timeout for proxy requests
    pub request_timeout: Duration,

    /// Retry policy for transient proxy failures
    pub retry: RetryConfig,

    /// Timeout for subprocess-backed tasks (datagen, prettier, git)
    pub command_timeout: Duration,

    /// Script passed to `uv run` by the data generation task
    pub datagen_script_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `AIPROXY_TOKEN` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_token = std::env::var("AIPROXY_TOKEN")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("AIPROXY_TOKEN".to_string()))?;

        let proxy_url = std::env::var("AIPROXY_URL")
            .unwrap_or_else(|_| DEFAULT_PROXY_URL.to_string());
        url::Url::parse(&proxy_url)
            .map_err(|e| ConfigError::InvalidValue("AIPROXY_URL".to_string(), format!("{}", e)))?;

        let classifier_model = std::env::var("CLASSIFIER_MODEL")
            .unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let embedding_model = std::env::var("EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());

        let data_root = std::env::var("DATA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/data"));
        if !data_root.is_absolute() {
            return Err(ConfigError::InvalidValue(
                "DATA_ROOT".to_string(),
                "must be an absolute path".to_string(),
            ));
        }

        let host = std::env::var("HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), format!("{}", e)))?;

        let timeout_secs: u64 = parse_var("CLASSIFIER_TIMEOUT_SECS", 20)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "CLASSIFIER_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let retry = RetryConfig {
            max_retries: parse_var("CLASSIFIER_MAX_RETRIES", 2)?,
            ..RetryConfig::default()
        };

        let command_timeout_secs: u64 = parse_var("COMMAND_TIMEOUT_SECS", 120)?;

        let datagen_script_url = std::env::var("DATAGEN_SCRIPT_URL")
            .unwrap_or_else(|_| DEFAULT_DATAGEN_SCRIPT_URL.to_string());

        Ok(Self {
            api_token,
            proxy_url,
            classifier_model,
            embedding_model,
            data_root,
            host,
            port,
            request_timeout: Duration::from_secs(timeout_secs),
            retry,
            command_timeout: Duration::from_secs(command_timeout_secs),
            datagen_script_url,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_token: String, proxy_url: String, data_root: PathBuf) -> Self {
        Self {
            api_token,
            proxy_url,
            classifier_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            data_root,
            host: "127.0.0.1".to_string(),
            port: 8000,
            request_timeout: Duration::from_secs(20),
            retry: RetryConfig::default(),
            command_timeout: Duration::from_secs(120),
            datagen_script_url: DEFAULT_DATAGEN_SCRIPT_URL.to_string(),
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}
