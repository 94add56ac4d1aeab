use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::PromLoggerError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String { "127.0.0.1:8080".to_string() }

/// Where the exposition route is mounted. `null` in YAML disables it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum MetricsEndpoint {
    Path(String),
    Disabled,
}

impl Default for MetricsEndpoint {
    fn default() -> Self {
        MetricsEndpoint::Path(DEFAULT_METRICS_PATH.to_string())
    }
}

impl From<Option<String>> for MetricsEndpoint {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(path) => MetricsEndpoint::Path(path),
            None => MetricsEndpoint::Disabled,
        }
    }
}

impl From<MetricsEndpoint> for Option<String> {
    fn from(value: MetricsEndpoint) -> Self {
        match value {
            MetricsEndpoint::Path(path) => Some(path),
            MetricsEndpoint::Disabled => None,
        }
    }
}

pub const DEFAULT_METRICS_PATH: &str = "/metrics";

impl MetricsEndpoint {
    pub fn path(&self) -> Option<&str> {
        match self {
            MetricsEndpoint::Path(path) => Some(path),
            MetricsEndpoint::Disabled => None,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), PromLoggerError> {
        let Some(path) = self.path() else {
            return Ok(());
        };

        if !path.starts_with('/') {
            return Err(PromLoggerError::Config(format!(
                "metrics endpoint must start with '/': {:?}",
                path
            )));
        }
        if path == "/" {
            return Err(PromLoggerError::Config(
                "metrics endpoint cannot be the root path".to_string(),
            ));
        }
        if path
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '?' | '#' | '{' | '}' | '*'))
        {
            return Err(PromLoggerError::Config(format!(
                "metrics endpoint contains invalid characters: {:?}",
                path
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub endpoint: MetricsEndpoint,
    /// Buckets for `http_request_duration_seconds` (default: prometheus defaults)
    #[serde(default)]
    pub duration_buckets: Option<Vec<f64>>,
    /// Buckets for the request/response size histograms
    #[serde(default)]
    pub size_buckets: Option<Vec<f64>>,
}

impl MetricsConfig {
    pub fn with_endpoint(endpoint: MetricsEndpoint) -> Self {
        Self {
            endpoint,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> std::result::Result<(), PromLoggerError> {
        self.endpoint.validate()?;
        if let Some(buckets) = &self.duration_buckets {
            validate_buckets("duration_buckets", buckets)?;
        }
        if let Some(buckets) = &self.size_buckets {
            validate_buckets("size_buckets", buckets)?;
        }
        Ok(())
    }
}

fn validate_buckets(field: &str, buckets: &[f64]) -> std::result::Result<(), PromLoggerError> {
    if buckets.is_empty() {
        return Err(PromLoggerError::Config(format!("{} must not be empty", field)));
    }
    if buckets.iter().any(|b| !b.is_finite()) {
        return Err(PromLoggerError::Config(format!(
            "{} must contain finite values",
            field
        )));
    }
    if buckets.windows(2).any(|w| w[0] >= w[1]) {
        return Err(PromLoggerError::Config(format!(
            "{} must be strictly increasing",
            field
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_format() -> LogFormat { LogFormat::Json }
fn default_log_level() -> String { "info".to_string() }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        settings.metrics.validate()?;
        Ok(settings)
    }
}
