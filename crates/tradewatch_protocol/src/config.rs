//! Application and source configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Raised when required configuration is missing or malformed. A missing
/// database URL is fatal: the run aborts before any stage starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// Process-level configuration, loaded from the environment once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database connection URL (`sqlite:...` or `postgres://...`).
    pub database_url: String,
    /// API key for the QuiverQuant authenticated endpoint.
    pub quiverquant_api_key: Option<String>,
    /// Default log filter when RUST_LOG is unset (DEBUG|INFO|WARN|ERROR).
    pub log_level: Option<String>,
    /// Override for the tradewatch home directory (blob store + logs).
    pub home_dir: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL".to_string()))?;

        Ok(Self {
            database_url,
            quiverquant_api_key: env_opt("QUIVERQUANT_API_KEY"),
            log_level: env_opt("LOG_LEVEL"),
            home_dir: env_opt("TRADEWATCH_HOME"),
        })
    }

    /// Configuration for tests: in-memory database, no external keys.
    pub fn for_testing() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            quiverquant_api_key: None,
            log_level: None,
            home_dir: None,
        }
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Per-source HTTP configuration. Each adapter supplies its own defaults;
/// `apply` merges pipeline-config overrides on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub source_type: String,
    pub base_url: String,
    /// Seconds to sleep between requests (rate limiting).
    pub request_delay: f64,
    pub max_retries: u32,
    /// Per-attempt timeout in seconds, not cumulative.
    pub timeout_seconds: u64,
    pub headers: Vec<(String, String)>,
    pub params: BTreeMap<String, String>,
}

impl SourceConfig {
    pub fn new(name: &str, source_type: &str, base_url: &str) -> Self {
        Self {
            name: name.to_string(),
            source_type: source_type.to_string(),
            base_url: base_url.to_string(),
            request_delay: 1.0,
            max_retries: 3,
            timeout_seconds: 30,
            headers: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_request_delay(mut self, seconds: f64) -> Self {
        self.request_delay = seconds;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Merge overrides from a pipeline config mapping. Unknown keys are
    /// ignored; only fields this struct carries can be overridden.
    pub fn apply(&mut self, overrides: &BTreeMap<String, serde_json::Value>) {
        if let Some(v) = overrides.get("base_url").and_then(|v| v.as_str()) {
            self.base_url = v.to_string();
        }
        if let Some(v) = overrides.get("request_delay").and_then(|v| v.as_f64()) {
            self.request_delay = v;
        }
        if let Some(v) = overrides.get("max_retries").and_then(|v| v.as_u64()) {
            self.max_retries = v as u32;
        }
        if let Some(v) = overrides.get("timeout").and_then(|v| v.as_u64()) {
            self.timeout_seconds = v;
        }
        if let Some(params) = overrides.get("params").and_then(|v| v.as_object()) {
            for (key, value) in params {
                if let Some(s) = value.as_str() {
                    self.params.insert(key.clone(), s.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_config_apply_overrides() {
        let mut config = SourceConfig::new("US House", "us_house", "https://example.gov")
            .with_request_delay(2.0)
            .with_timeout(60);

        let mut overrides = BTreeMap::new();
        overrides.insert("request_delay".to_string(), serde_json::json!(0.5));
        overrides.insert("max_retries".to_string(), serde_json::json!(5));
        overrides.insert("unknown_key".to_string(), serde_json::json!("ignored"));

        config.apply(&overrides);

        assert!((config.request_delay - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.timeout_seconds, 60);
        assert_eq!(config.base_url, "https://example.gov");
    }

    #[test]
    fn test_testing_config_needs_no_env() {
        let config = AppConfig::for_testing();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert!(config.quiverquant_api_key.is_none());
    }
}
