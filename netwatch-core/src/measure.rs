//! The measurement produced by one probe invocation.

use std::fmt;

/// A named, optionally-present numeric value with a unit.
///
/// `value` is `None` exactly when the probe failed; `failure` then carries
/// the reason. A measured zero is `Some(0.0)`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Measurement {
    pub name: String,
    pub value: Option<f64>,
    pub unit: String,
    pub timestamp_unix_nanos: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl Measurement {
    pub fn success(name: &str, value: f64, unit: &str, timestamp_unix_nanos: u64) -> Self {
        Self {
            name: name.to_string(),
            value: Some(value),
            unit: unit.to_string(),
            timestamp_unix_nanos,
            failure: None,
        }
    }

    pub fn failed(
        name: &str,
        unit: &str,
        timestamp_unix_nanos: u64,
        reason: impl fmt::Display,
    ) -> Self {
        Self {
            name: name.to_string(),
            value: None,
            unit: unit.to_string(),
            timestamp_unix_nanos,
            failure: Some(reason.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(v) => write!(f, "{}: {} {}", self.name, v, self.unit),
            None => write!(f, "{}: no value obtained", self.name),
        }
    }
}
