// Client configuration (passed explicitly, no process-wide client)

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// How `add_metric` delivers: straight to the transport, or via the job table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    #[default]
    Synchronous,
    Deferred,
}

/// Metrics client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Account API key
    pub api_key: Option<String>,

    /// Application identifier
    pub application_id: Option<String>,

    /// Distinct user id applied when `add_metric` gets none
    pub distinct_id: Option<String>,

    pub mode: DeliveryMode,

    /// Suppress all metrics (staging/development)
    pub disabled: bool,
}

impl MetricsConfig {
    pub fn new(api_key: impl Into<String>, application_id: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            application_id: Some(application_id.into()),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_distinct_id(mut self, distinct_id: impl Into<String>) -> Self {
        self.distinct_id = Some(distinct_id.into());
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Check credentials and return the configured application id
    pub fn require_credentials(&self) -> Result<&str> {
        if non_empty(&self.api_key).is_none() {
            return Err(AppError::Configuration(
                "API Key must be set before adding metrics".to_string(),
            ));
        }
        non_empty(&self.application_id).ok_or_else(|| {
            AppError::Configuration(
                "Application identifier must be set before adding metrics".to_string(),
            )
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}
