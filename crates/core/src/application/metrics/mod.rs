// Metrics Client - producer-facing entry point

pub mod enqueue;

pub use enqueue::EnqueueRequest;

use crate::config::{DeliveryMode, MetricsConfig};
use crate::domain::{JobId, MetricValue};
use crate::error::{AppError, Result};
use crate::port::time_provider::SystemTimeProvider;
use crate::port::{JobStore, MetricTransport, TimeProvider};
use std::sync::Arc;
use tracing::debug;

/// What `add_metric` did with a metric
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricReceipt {
    /// Delivered synchronously
    Sent,
    /// Stored as a delayed job
    Queued(JobId),
    /// Dropped because the client is disabled
    Suppressed,
}

/// Metrics client
///
/// Delivery mode is fixed by the configuration: synchronous clients call the
/// transport directly, deferred clients only write to the job store.
pub struct MetricsClient {
    config: MetricsConfig,
    transport: Arc<dyn MetricTransport>,
    job_store: Option<Arc<dyn JobStore>>,
    time_provider: Arc<dyn TimeProvider>,
}

impl MetricsClient {
    pub fn new(config: MetricsConfig, transport: Arc<dyn MetricTransport>) -> Self {
        Self {
            config,
            transport,
            job_store: None,
            time_provider: Arc::new(SystemTimeProvider),
        }
    }

    /// Job store used in deferred mode
    pub fn with_job_store(mut self, job_store: Arc<dyn JobStore>) -> Self {
        self.job_store = Some(job_store);
        self
    }

    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    /// Add a metric
    ///
    /// # Arguments
    ///
    /// * `metric_name` - The name of the metric
    /// * `value` - A scalar for standard metrics or a sequence for compound metrics
    /// * `distinct_id` - Optional user identifier; overrides the configured one
    ///
    /// # Errors
    /// - `Configuration` if the API key or application id is missing, or the
    ///   client is deferred without a job store
    /// - `Delivery` from the transport in synchronous mode
    /// - `Queue` / `Serialization` from the job store in deferred mode
    pub async fn add_metric(
        &self,
        metric_name: &str,
        value: impl Into<MetricValue>,
        distinct_id: Option<&str>,
    ) -> Result<MetricReceipt> {
        let application_id = self.config.require_credentials()?;

        if self.config.disabled {
            return Ok(MetricReceipt::Suppressed);
        }

        if metric_name.trim().is_empty() {
            return Err(AppError::Validation("Metric name cannot be empty".to_string()));
        }

        let value = value.into();
        let distinct_id = distinct_id.or(self.config.distinct_id.as_deref());

        match self.config.mode {
            DeliveryMode::Synchronous => {
                debug!(application_id = %application_id, metric = %metric_name, "Sending metric");
                self.transport
                    .send(application_id, metric_name, &value, distinct_id)
                    .await?;
                Ok(MetricReceipt::Sent)
            }
            DeliveryMode::Deferred => {
                let job_store = self.job_store.as_deref().ok_or_else(|| {
                    AppError::Configuration(
                        "Can't queue a delayed job without a job store".to_string(),
                    )
                })?;
                let req = EnqueueRequest {
                    application_id: application_id.to_string(),
                    metric_name: metric_name.to_string(),
                    value,
                    distinct_id: distinct_id.map(str::to_string),
                };
                let job_id = enqueue::execute(job_store, self.time_provider.as_ref(), req).await?;
                Ok(MetricReceipt::Queued(job_id))
            }
        }
    }
}
