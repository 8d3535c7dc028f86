// Request bodies for the tracking API

use restful_metrics_core::domain::{MetricValue, Scalar};
use serde::Serialize;

/// Top-level body: `{"metric": {...}}` or `{"compound_metric": {...}}`
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Envelope<'a> {
    Metric(StandardMetric<'a>),
    CompoundMetric(CompoundMetric<'a>),
}

#[derive(Debug, Serialize)]
pub(crate) struct StandardMetric<'a> {
    name: &'a str,
    value: &'a Scalar,
    #[serde(skip_serializing_if = "Option::is_none")]
    distinct_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CompoundMetric<'a> {
    name: &'a str,
    values: &'a [Scalar],
    #[serde(skip_serializing_if = "Option::is_none")]
    distinct_id: Option<&'a str>,
}

impl<'a> Envelope<'a> {
    pub(crate) fn new(name: &'a str, value: &'a MetricValue, distinct_id: Option<&'a str>) -> Self {
        match value {
            MetricValue::Scalar(value) => Envelope::Metric(StandardMetric {
                name,
                value,
                distinct_id,
            }),
            MetricValue::Compound(values) => Envelope::CompoundMetric(CompoundMetric {
                name,
                values,
                distinct_id,
            }),
        }
    }

    /// Last path segment of the endpoint this body is posted to
    pub(crate) fn endpoint(&self) -> &'static str {
        match self {
            Envelope::Metric(_) => "metrics.json",
            Envelope::CompoundMetric(_) => "compound_metrics.json",
        }
    }
}
