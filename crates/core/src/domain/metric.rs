// Metric Value Domain Model

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single metric value
///
/// Integers must fit in an `i64`; a larger one is a decode error rather than a
/// silently rounded `Float`. JSON integers beyond `u64` are already floats when
/// the parser hands them over and stay `Float`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ScalarVisitor;

        impl<'de> Visitor<'de> for ScalarVisitor {
            type Value = Scalar;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a boolean, number or string")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Scalar, E> {
                Ok(Scalar::Bool(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Scalar, E> {
                Ok(Scalar::Integer(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Scalar, E> {
                i64::try_from(v).map(Scalar::Integer).map_err(|_| {
                    E::custom(format!("integer {} is out of range for a metric value", v))
                })
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Scalar, E> {
                Ok(Scalar::Float(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Scalar, E> {
                Ok(Scalar::Text(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Scalar, E> {
                Ok(Scalar::Text(v))
            }
        }

        deserializer.deserialize_any(ScalarVisitor)
    }
}

impl Scalar {
    fn is_finite(&self) -> bool {
        match self {
            Scalar::Float(f) => f.is_finite(),
            _ => true,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Integer(i)
    }
}

impl From<i32> for Scalar {
    fn from(i: i32) -> Self {
        Scalar::Integer(i64::from(i))
    }
}

impl From<f64> for Scalar {
    fn from(x: f64) -> Self {
        Scalar::Float(x)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

/// Metric value: a plain scalar, or an ordered sequence for compound metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Compound(Vec<Scalar>),
    Scalar(Scalar),
}

impl MetricValue {
    pub fn is_compound(&self) -> bool {
        matches!(self, MetricValue::Compound(_))
    }

    /// Serialize for storage in the job table
    ///
    /// Non-finite floats are rejected here: JSON has no representation for them
    /// and they would otherwise come back as `null` and fail at delivery time.
    pub fn encode(&self) -> Result<EncodedValue, serde_json::Error> {
        let finite = match self {
            MetricValue::Scalar(s) => s.is_finite(),
            MetricValue::Compound(values) => values.iter().all(Scalar::is_finite),
        };
        if !finite {
            return Err(<serde_json::Error as serde::ser::Error>::custom(
                "metric value contains a non-finite float",
            ));
        }
        serde_json::to_string(self).map(EncodedValue)
    }
}

macro_rules! metric_value_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for MetricValue {
                fn from(value: $t) -> Self {
                    MetricValue::Scalar(value.into())
                }
            }

            impl From<Vec<$t>> for MetricValue {
                fn from(values: Vec<$t>) -> Self {
                    MetricValue::Compound(values.into_iter().map(Into::into).collect())
                }
            }
        )*
    };
}

metric_value_from!(bool, i64, i32, f64, &str, String);

impl From<Scalar> for MetricValue {
    fn from(value: Scalar) -> Self {
        MetricValue::Scalar(value)
    }
}

impl From<Vec<Scalar>> for MetricValue {
    fn from(values: Vec<Scalar>) -> Self {
        MetricValue::Compound(values)
    }
}

/// Opaque serialized metric value as stored in the `value` column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedValue(String);

impl EncodedValue {
    /// Wrap a raw column value read back from the store
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn decode(&self) -> Result<MetricValue, serde_json::Error> {
        serde_json::from_str(&self.0)
    }
}
