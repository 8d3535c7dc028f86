//! HTTP transport for the RESTful Metrics tracking API.
//!
//! Posts one metric per request and maps the response status onto
//! `DeliveryError` so the runner can tell rejected credentials from
//! everything else.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, StatusCode, Url};
use restful_metrics_core::domain::MetricValue;
use restful_metrics_core::error::{AppError, Result};
use restful_metrics_core::port::{DeliveryError, MetricTransport};
use tracing::{debug, warn};

use crate::payload::Envelope;

/// Production tracking endpoint.
pub const DEFAULT_BASE_URL: &str = "http://track.restfulmetrics.com";

const CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Scheme and host of the tracking API, without the `/apps/...` part.
    pub base_url: String,
    /// Account API key, sent verbatim in the `Authorization` header.
    pub api_key: String,
    /// Timeout for a whole request.
    pub timeout: Duration,
    pub user_agent: String,
}

impl HttpTransportConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(30),
            user_agent: format!("restful-metrics-rust/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// `MetricTransport` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl HttpTransport {
    /// Creates a transport with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Configuration` if the base URL is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            AppError::Configuration(format!("Invalid base URL '{}': {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Configuration(format!(
                "Invalid base URL '{}': cannot hold a path",
                config.base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| AppError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
        })
    }

    /// `{base}/apps/{application_id}/{endpoint}` with the application id
    /// percent-encoded as a single path segment.
    fn endpoint_url(&self, application_id: &str, endpoint: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["apps", application_id, endpoint]);
        }
        url
    }
}

#[async_trait]
impl MetricTransport for HttpTransport {
    async fn send(
        &self,
        application_id: &str,
        metric_name: &str,
        value: &MetricValue,
        distinct_id: Option<&str>,
    ) -> std::result::Result<(), DeliveryError> {
        let envelope = Envelope::new(metric_name, value, distinct_id);
        let url = self.endpoint_url(application_id, envelope.endpoint());
        let body = serde_json::to_vec(&envelope)
            .map_err(|e| DeliveryError::Transport(format!("Problem encoding metric: {e}")))?;

        debug!(url = %url, metric = %metric_name, "Posting metric");

        let response = self
            .client
            .post(url.clone())
            .header(header::AUTHORIZATION, &self.api_key)
            .header(header::CONTENT_TYPE, CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, "Request failed: {}", e);
                DeliveryError::Transport(format!("Problem executing request at {url}: {e}"))
            })?;

        let status = response.status();
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED => Err(DeliveryError::Auth(
                "Received unauthorized response; check your API Key".to_string(),
            )),
            s => {
                warn!(status = s.as_u16(), metric = %metric_name, "Unexpected status code");
                Err(DeliveryError::Transport(format!(
                    "An undefined error occurred when sending the metric. Received response status code: {}",
                    s.as_u16()
                )))
            }
        }
    }
}
