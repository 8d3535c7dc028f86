// Layered configuration: optional TOML file, then RESTFUL_METRICS__* environment

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use restful_metrics_core::application::runner::constants::{
    DEFAULT_RUN_INTERVAL, DEFAULT_STALE_LOCK_WINDOW_MS,
};
use restful_metrics_core::MetricsConfig;
use restful_metrics_infra_http::DEFAULT_BASE_URL;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Looked up in the working directory, any supported extension
const DEFAULT_CONFIG_NAME: &str = "restful-metrics";
const DEFAULT_DB_PATH: &str = "~/.restful-metrics/jobs.db";
const ENV_PREFIX: &str = "RESTFUL_METRICS";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub metrics: MetricsConfig,
    pub database: DatabaseSettings,
    pub http: HttpSettings,
    pub runner: RunnerSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite path or URL, `~` is expanded
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_DB_PATH.to_string(),
            max_connections: 10,
        }
    }
}

impl DatabaseSettings {
    pub fn expanded_url(&self) -> String {
        shellexpand::tilde(&self.url).into_owned()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Unset means failed jobs are retried forever
    pub max_attempts: Option<i32>,
    pub interval_secs: u64,
    pub stale_lock_secs: u64,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            max_attempts: None,
            interval_secs: DEFAULT_RUN_INTERVAL.as_secs(),
            stale_lock_secs: (DEFAULT_STALE_LOCK_WINDOW_MS / 1000) as u64,
        }
    }
}

impl RunnerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn stale_lock_ms(&self) -> i64 {
        (self.stale_lock_secs as i64).saturating_mul(1000)
    }
}

impl Settings {
    /// Load settings from `path` (or `restful-metrics.toml` if present) and the environment
    ///
    /// Environment keys use `__` between sections:
    /// `RESTFUL_METRICS__METRICS__API_KEY`, `RESTFUL_METRICS__RUNNER__MAX_ATTEMPTS`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings = Config::builder()
            .add_source(file)
            .add_source(env)
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        Ok(settings)
    }
}
