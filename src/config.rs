//! Process configuration loading and validation.
//!
//! Configuration is read once at startup from a TOML document and injected
//! into the components that need it. `CAISSON_DATABASE_URL` overrides the
//! database URL from the file.

use crate::telemetry::LogFormat;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding `database.url`.
pub const DATABASE_URL_ENV: &str = "CAISSON_DATABASE_URL";

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The configuration document is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// The configuration parsed but violates a constraint.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level control plane configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Persistence settings.
    pub database: DatabaseConfig,
    /// Log artifact settings.
    pub logs: LogsConfig,
    /// Task defaults.
    pub tasks: TasksConfig,
    /// Registered execution workers.
    pub runners: RunnersConfig,
    /// Logging output settings.
    pub telemetry: TelemetryConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the API listens on.
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 9030)),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `PostgreSQL` URL; in-memory adapters are used when absent.
    pub url: Option<String>,
    /// Maximum pooled connections.
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: 8,
        }
    }
}

/// Log artifact settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    /// Root directory holding `<template>/<task>/output.log` artifacts.
    pub base_dir: PathBuf,
    /// Delay before re-reading a log after reaching its current end.
    pub follow_backoff_ms: u64,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("var/logs"),
            follow_backoff_ms: 1000,
        }
    }
}

impl LogsConfig {
    /// Returns the follow backoff as a [`Duration`].
    #[must_use]
    pub const fn follow_backoff(&self) -> Duration {
        Duration::from_millis(self.follow_backoff_ms)
    }
}

/// Task defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    /// Step timeout used when neither request nor template sets one.
    pub default_step_timeout_secs: u64,
    /// Attempts at persisting a terminal task or reconciling scan results
    /// before giving up.
    pub persist_attempts: u32,
    /// Delay before the first retry; doubled on each further attempt.
    pub retry_backoff_ms: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            default_step_timeout_secs: 3600,
            persist_attempts: 5,
            retry_backoff_ms: 500,
        }
    }
}

impl TasksConfig {
    /// Returns the first retry delay as a [`Duration`].
    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// A single registered worker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunnerEndpoint {
    /// Runner identifier referenced by tasks and environments.
    pub id: String,
    /// Base URL of the worker API.
    pub base_url: String,
}

/// Registered execution workers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunnersConfig {
    /// Runner chosen when a task names none.
    pub default: Option<String>,
    /// Known runners.
    pub endpoints: Vec<RunnerEndpoint>,
}

/// Logging output settings.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Output format.
    pub format: LogFormat,
}

impl ControlPlaneConfig {
    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed documents and
    /// [`ConfigError::Invalid`] when a constraint is violated.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed or
    /// validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&raw)?;
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            config.database.url = Some(url);
        }
        Ok(config)
    }

    /// Returns the default step timeout as a [`Duration`].
    #[must_use]
    pub const fn default_step_timeout(&self) -> Duration {
        Duration::from_secs(self.tasks.default_step_timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.logs.follow_backoff_ms == 0 {
            return Err(ConfigError::Invalid(
                "logs.follow_backoff_ms must be > 0".to_owned(),
            ));
        }

        if self.tasks.default_step_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "tasks.default_step_timeout_secs must be > 0".to_owned(),
            ));
        }

        if self.tasks.persist_attempts == 0 {
            return Err(ConfigError::Invalid(
                "tasks.persist_attempts must be > 0".to_owned(),
            ));
        }

        if self.database.pool_size == 0 {
            return Err(ConfigError::Invalid(
                "database.pool_size must be > 0".to_owned(),
            ));
        }

        for endpoint in &self.runners.endpoints {
            if endpoint.id.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "runners.endpoints[].id must not be empty".to_owned(),
                ));
            }
            if !endpoint.base_url.starts_with("http://")
                && !endpoint.base_url.starts_with("https://")
            {
                return Err(ConfigError::Invalid(format!(
                    "runner '{}' base_url must start with http:// or https://",
                    endpoint.id
                )));
            }
        }

        if let Some(default) = &self.runners.default {
            let known = self
                .runners
                .endpoints
                .iter()
                .any(|endpoint| &endpoint.id == default);
            if !known {
                return Err(ConfigError::Invalid(format!(
                    "runners.default '{default}' is not a registered runner"
                )));
            }
        }

        Ok(())
    }
}
