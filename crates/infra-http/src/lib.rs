// RESTful Metrics Infrastructure - HTTP Adapter
// Implements: MetricTransport

mod client;
mod payload;

pub use client::{HttpTransport, HttpTransportConfig, DEFAULT_BASE_URL};
