//! The consolidated result of one monitor run, and its narration.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use async_trait::async_trait;
use netwatch_core::delegate::{DelegateError, DelegateTask, ReasoningDelegate};
use netwatch_core::measure::Measurement;
use netwatch_core::observe::{SpanId, TraceId};

/// Ordered, immutable mapping of probe name to measurement.
///
/// Entries appear in probe configuration order regardless of execution
/// mode. Every configured probe has exactly one entry.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Report {
    trace_id: TraceId,
    run_span_id: SpanId,
    started_unix_nanos: u64,
    finished_unix_nanos: u64,
    results: Vec<Measurement>,
}

impl Report {
    pub(crate) fn new(
        trace_id: TraceId,
        run_span_id: SpanId,
        started_unix_nanos: u64,
        finished_unix_nanos: u64,
        results: Vec<Measurement>,
    ) -> Self {
        Self {
            trace_id,
            run_span_id,
            started_unix_nanos,
            finished_unix_nanos,
            results,
        }
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// Id of the `monitor_run` span covering this run.
    pub fn run_span_id(&self) -> SpanId {
        self.run_span_id
    }

    pub fn started_unix_nanos(&self) -> u64 {
        self.started_unix_nanos
    }

    pub fn finished_unix_nanos(&self) -> u64 {
        self.finished_unix_nanos
    }

    pub fn get(&self, name: &str) -> Option<&Measurement> {
        self.results.iter().find(|m| m.name == name)
    }

    /// The value for `name`; `None` if the probe failed or is unknown.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|m| m.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.results.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.results.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Measurements with no value.
    pub fn failed(&self) -> impl Iterator<Item = &Measurement> {
        self.results.iter().filter(|m| !m.is_success())
    }

    /// Whether every probe produced a value.
    pub fn is_complete(&self) -> bool {
        self.results.iter().all(Measurement::is_success)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the JSON form to `path`, creating parent directories.
    pub fn write_json(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = self
            .to_json_pretty()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }
}

impl<'a> IntoIterator for &'a Report {
    type Item = &'a Measurement;
    type IntoIter = std::slice::Iter<'a, Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Network report (trace {})", self.trace_id)?;
        for m in &self.results {
            writeln!(f, "  {m}")?;
        }
        Ok(())
    }
}

/// Ask `delegate` to narrate `report`.
///
/// Delegate failures are logged and swallowed: narration is optional and
/// the report itself is already complete.
pub async fn narrate(report: &Report, delegate: &dyn ReasoningDelegate) -> Option<String> {
    let context = match report.to_json_pretty() {
        Ok(json) => json,
        Err(e) => {
            tracing::debug!(error = %e, "report not serializable for narration");
            return None;
        }
    };
    let task = DelegateTask::new("Summarize the network measurement report for an operator.")
        .with_context(context)
        .with_tools(report.names());
    match delegate.describe(&task).await {
        Ok(text) if text.trim().is_empty() => None,
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!(error = %e, "narration unavailable");
            None
        }
    }
}

/// Model-free delegate: a fixed one-line summary of a JSON report context.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryDelegate;

#[async_trait]
impl ReasoningDelegate for SummaryDelegate {
    async fn describe(&self, task: &DelegateTask) -> Result<String, DelegateError> {
        let report: Report = serde_json::from_str(&task.context)
            .map_err(|e| DelegateError::Rejected(format!("context is not a report: {e}")))?;
        let parts: Vec<String> = report.iter().map(ToString::to_string).collect();
        let failed = report.failed().count();
        let verdict = match failed {
            0 => "all probes produced a value".to_string(),
            n if n == report.len() => "no probe produced a value".to_string(),
            n => format!("{n} of {} probes produced no value", report.len()),
        };
        Ok(format!("{}; {verdict}.", parts.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Report {
        let trace = TraceId::from_bytes([9; 16]);
        Report::new(
            trace,
            SpanId::derive(&trace, "monitor_run", 0),
            10,
            20,
            vec![
                Measurement::success("network_latency", 12.3, "ms", 15),
                Measurement::failed("packet_usage", "packets", 16, "netstat missing"),
            ],
        )
    }

    struct Broken;

    #[async_trait]
    impl ReasoningDelegate for Broken {
        async fn describe(&self, _task: &DelegateTask) -> Result<String, DelegateError> {
            Err(DelegateError::Unavailable("no credentials".to_string()))
        }
    }

    #[test]
    fn lookup_and_order() {
        let report = sample();
        assert_eq!(report.names(), vec!["network_latency", "packet_usage"]);
        assert_eq!(report.value("network_latency"), Some(12.3));
        assert_eq!(report.value("packet_usage"), None);
        assert!(report.get("packet_usage").is_some());
        assert!(report.get("cpu").is_none());
        assert!(!report.is_complete());
        assert_eq!(report.failed().count(), 1);
    }

    #[test]
    fn display_marks_missing_values() {
        let text = sample().to_string();
        assert!(text.contains("network_latency: 12.3 ms"));
        assert!(text.contains("packet_usage: no value obtained"));
    }

    #[test]
    fn json_keeps_order_and_trace_id() {
        let report = sample();
        let json: serde_json::Value =
            serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["trace_id"], report.trace_id().to_string());
        assert_eq!(json["results"][0]["name"], "network_latency");
        assert_eq!(json["results"][1]["value"], serde_json::Value::Null);
    }

    #[test]
    fn write_json_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("round-1").join("report.json");
        sample().write_json(&path).unwrap();
        let back: Report = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(back, sample());
    }

    #[tokio::test]
    async fn summary_delegate_narrates() {
        let text = narrate(&sample(), &SummaryDelegate).await.unwrap();
        assert_eq!(
            text,
            "network_latency: 12.3 ms, packet_usage: no value obtained; 1 of 2 probes produced no value."
        );
    }

    #[tokio::test]
    async fn delegate_failure_is_absorbed() {
        assert_eq!(narrate(&sample(), &Broken).await, None);
        assert_eq!(
            narrate(&sample(), &netwatch_core::delegate::NullDelegate).await,
            None
        );
    }
}
