//! Stub facilities and emitters
//!
//! Used by tests and by `netwatch/examples/dry_run.rs`, where no real
//! facility should be touched.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use netwatch_core::observe::{
    EventRecord, ExportError, MetricRecord, RunEventEmitter, SpanRecord, TelemetryRecord,
};
use netwatch_core::parse::PacketCounters;

use crate::facility::{Facility, FacilityOutput};
use crate::{FacilityError, Result};

#[derive(Debug, Clone)]
enum Canned {
    Output(FacilityOutput),
    Unavailable(String),
    NonZeroExit(i32),
}

/// A facility that always answers the same way.
#[derive(Debug)]
pub struct StaticFacility {
    canned: Canned,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticFacility {
    fn with(canned: Canned) -> Self {
        Self {
            canned,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn text(output: impl Into<String>) -> Self {
        Self::with(Canned::Output(FacilityOutput::Text(output.into())))
    }

    pub fn counters(sent: u64, received: u64) -> Self {
        Self::with(Canned::Output(FacilityOutput::Counters(PacketCounters::new(
            sent, received,
        ))))
    }

    /// Behaves like a missing program.
    pub fn unavailable(program: impl Into<String>) -> Self {
        Self::with(Canned::Unavailable(program.into()))
    }

    pub fn non_zero_exit(code: i32) -> Self {
        Self::with(Canned::NonZeroExit(code))
    }

    /// Wait before answering (for timeout tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Facility for StaticFacility {
    fn describe(&self) -> String {
        "static stub".to_string()
    }

    async fn invoke(&self) -> Result<FacilityOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.canned {
            Canned::Output(out) => Ok(out.clone()),
            Canned::Unavailable(program) => Err(FacilityError::Unavailable {
                program: program.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "stubbed as missing"),
            }),
            Canned::NonZeroExit(code) => Err(FacilityError::NonZeroExit {
                program: "stub".to_string(),
                status: format!("exit status: {code}"),
                detail: String::new(),
            }),
        }
    }
}

/// An emitter whose backend is always down.
#[derive(Debug, Default)]
pub struct FailingEmitter {
    attempts: Arc<AtomicUsize>,
}

impl FailingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counter of export attempts.
    pub fn attempts(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.attempts)
    }

    fn refuse(&self) -> core::result::Result<(), ExportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ExportError::Io(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "collector unreachable",
        )))
    }
}

impl RunEventEmitter for FailingEmitter {
    type Error = ExportError;

    fn emit_span(&mut self, _span: &SpanRecord) -> core::result::Result<(), Self::Error> {
        self.refuse()
    }

    fn emit_event(&mut self, _event: &EventRecord) -> core::result::Result<(), Self::Error> {
        self.refuse()
    }

    fn emit_metric(&mut self, _metric: &MetricRecord) -> core::result::Result<(), Self::Error> {
        self.refuse()
    }

    fn flush(&mut self) -> core::result::Result<(), Self::Error> {
        self.refuse()
    }
}

/// An emitter that keeps every record in a shared buffer.
#[derive(Debug, Clone, Default)]
pub struct CapturingEmitter {
    records: Arc<Mutex<Vec<TelemetryRecord>>>,
}

impl CapturingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn spans(&self) -> Vec<SpanRecord> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                TelemetryRecord::Span(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn metrics(&self) -> Vec<MetricRecord> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                TelemetryRecord::Metric(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    fn push(&self, record: TelemetryRecord) -> core::result::Result<(), ExportError> {
        self.records
            .lock()
            .map_err(|_| ExportError::Rejected("capture buffer poisoned".to_string()))?
            .push(record);
        Ok(())
    }
}

impl RunEventEmitter for CapturingEmitter {
    type Error = ExportError;

    fn emit_span(&mut self, span: &SpanRecord) -> core::result::Result<(), Self::Error> {
        self.push(TelemetryRecord::Span(span.clone()))
    }

    fn emit_event(&mut self, event: &EventRecord) -> core::result::Result<(), Self::Error> {
        self.push(TelemetryRecord::Event(event.clone()))
    }

    fn emit_metric(&mut self, metric: &MetricRecord) -> core::result::Result<(), Self::Error> {
        self.push(TelemetryRecord::Metric(metric.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_facility_counts_calls() {
        let f = StaticFacility::counters(100, 250);
        assert_eq!(
            f.invoke().await.unwrap(),
            FacilityOutput::Counters(PacketCounters::new(100, 250))
        );
        f.invoke().await.unwrap();
        assert_eq!(f.calls(), 2);
    }

    #[tokio::test]
    async fn unavailable_stub_reports_missing_program() {
        let err = StaticFacility::unavailable("ping").invoke().await.unwrap_err();
        assert!(err.to_string().contains("ping"));
    }

    #[test]
    fn failing_emitter_counts_attempts() {
        let mut emitter = FailingEmitter::new();
        let attempts = emitter.attempts();
        assert!(emitter.flush().is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
