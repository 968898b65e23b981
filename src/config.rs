use crate::error::{Result, StreamError};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::time::Duration;

/// Default upper bound for bytes held by the frame buffer while waiting for a boundary
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the chat backend, e.g. `http://127.0.0.1:8080`
    pub endpoint: String,
    /// Path of the streaming chat route
    pub stream_path: String,
    pub connect_timeout_secs: u64,
    /// Maximum silence between two chunks before the session fails
    pub idle_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub max_buffer_bytes: usize,
    /// Cancel still-running sessions when a new one is started
    pub cancel_superseded: bool,
    /// Extra request headers sent on every stream open
    pub headers: HashMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080".to_string(),
            stream_path: "/api/chat/stream".to_string(),
            connect_timeout_secs: 10,
            idle_timeout_secs: 120,
            heartbeat_interval_secs: 15,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            cancel_superseded: true,
            headers: HashMap::new(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let endpoint = env::var("ANSWER_STREAM_ENDPOINT").unwrap_or(defaults.endpoint);
        let stream_path = env::var("ANSWER_STREAM_PATH").unwrap_or(defaults.stream_path);

        let connect_timeout_secs = parse_env(
            "ANSWER_STREAM_CONNECT_TIMEOUT_SECS",
            defaults.connect_timeout_secs,
        )?;
        let idle_timeout_secs =
            parse_env("ANSWER_STREAM_IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs)?;
        let heartbeat_interval_secs = parse_env(
            "ANSWER_STREAM_HEARTBEAT_SECS",
            defaults.heartbeat_interval_secs,
        )?;
        let max_buffer_bytes =
            parse_env("ANSWER_STREAM_MAX_BUFFER_BYTES", defaults.max_buffer_bytes)?;
        let cancel_superseded =
            parse_env("ANSWER_STREAM_CANCEL_SUPERSEDED", defaults.cancel_superseded)?;

        let mut headers = HashMap::new();
        if let Ok(token) = env::var("ANSWER_STREAM_AUTH_TOKEN") {
            headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        }

        Ok(ClientConfig {
            endpoint,
            stream_path,
            connect_timeout_secs,
            idle_timeout_secs,
            heartbeat_interval_secs,
            max_buffer_bytes,
            cancel_superseded,
            headers,
        })
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| StreamError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let mut config: ClientConfig = toml::from_str(&contents)
            .map_err(|e| StreamError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        // Allow environment variables to override file config
        if let Ok(endpoint) = env::var("ANSWER_STREAM_ENDPOINT") {
            config.endpoint = endpoint;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(StreamError::ConfigError("Endpoint is empty".to_string()));
        }

        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(StreamError::ConfigError(format!(
                "Endpoint must be an http(s) URL: {}",
                self.endpoint
            )));
        }

        if self.connect_timeout_secs == 0 || self.idle_timeout_secs == 0 {
            return Err(StreamError::ConfigError(
                "Timeouts must be greater than 0".to_string(),
            ));
        }

        if self.heartbeat_interval_secs == 0 {
            return Err(StreamError::ConfigError(
                "Heartbeat interval must be greater than 0".to_string(),
            ));
        }

        if self.max_buffer_bytes == 0 {
            return Err(StreamError::ConfigError(
                "Max buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Full URL of the streaming route
    pub fn stream_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        if self.stream_path.starts_with('/') {
            format!("{}{}", base, self.stream_path)
        } else {
            format!("{}/{}", base, self.stream_path)
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| StreamError::ConfigError(format!("Invalid {} value: {}", name, e))),
        Err(_) => Ok(default),
    }
}
