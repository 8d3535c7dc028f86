// Metric Transport Port
// Abstraction over the remote metrics service

use crate::domain::MetricValue;
use async_trait::async_trait;
use thiserror::Error;

/// Delivery errors reported by a transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Credentials rejected by the remote service
    #[error("{0}")]
    Auth(String),

    /// Network failure or any non-success status other than auth
    #[error("{0}")]
    Transport(String),
}

/// Metric Transport trait
///
/// Implementations:
/// - HttpTransport (infra-http): POSTs to the tracking endpoint
/// - mocks::MockTransport: records calls for tests
#[async_trait]
pub trait MetricTransport: Send + Sync {
    /// Send one metric and wait for the outcome
    ///
    /// The application id is passed on every call; transports hold no
    /// per-application state.
    ///
    /// # Errors
    /// - DeliveryError::Auth if the API key is rejected
    /// - DeliveryError::Transport for network failures and unexpected statuses
    async fn send(
        &self,
        application_id: &str,
        metric_name: &str,
        value: &MetricValue,
        distinct_id: Option<&str>,
    ) -> Result<(), DeliveryError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Mock transport behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed
        Success,
        /// Always fail with a transport error
        Fail(String),
        /// Always fail with an auth error
        Unauthorized(String),
        /// Fail only for the given metric name, succeed otherwise
        FailMetric { metric_name: String, message: String },
    }

    /// A call received by the mock
    #[derive(Debug, Clone, PartialEq)]
    pub struct SentMetric {
        pub application_id: String,
        pub metric_name: String,
        pub value: MetricValue,
        pub distinct_id: Option<String>,
    }

    /// Mock Metric Transport for testing
    pub struct MockTransport {
        behavior: Mutex<MockBehavior>,
        sent: Mutex<Vec<SentMetric>>,
    }

    impl MockTransport {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Mutex::new(behavior),
                sent: Mutex::new(Vec::new()),
            }
        }
        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }
        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }
        pub fn new_unauthorized(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Unauthorized(message.into()))
        }
        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }
        /// Every call attempted, successful or not, in call order
        pub fn sent(&self) -> Vec<SentMetric> {
            self.sent.lock().unwrap().clone()
        }
        pub fn call_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MetricTransport for MockTransport {
        async fn send(
            &self,
            application_id: &str,
            metric_name: &str,
            value: &MetricValue,
            distinct_id: Option<&str>,
        ) -> Result<(), DeliveryError> {
            self.sent.lock().unwrap().push(SentMetric {
                application_id: application_id.to_string(),
                metric_name: metric_name.to_string(),
                value: value.clone(),
                distinct_id: distinct_id.map(str::to_string),
            });

            let behavior = self.behavior.lock().unwrap().clone();

            match behavior {
                MockBehavior::Success => Ok(()),
                MockBehavior::Fail(msg) => Err(DeliveryError::Transport(msg)),
                MockBehavior::Unauthorized(msg) => Err(DeliveryError::Auth(msg)),
                MockBehavior::FailMetric {
                    metric_name: failing,
                    message,
                } => {
                    if failing == metric_name {
                        Err(DeliveryError::Transport(message))
                    } else {
                        Ok(())
                    }
                }
            }
        }
    }
}
