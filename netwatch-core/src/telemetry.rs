//! `tracing` integration (optional).
//!
//! [`TracingEmitter`] replays telemetry records as `tracing` events under the
//! `netwatch::telemetry` target, so a plain log subscriber doubles as a
//! telemetry backend when no collector is configured.

use crate::observe::{
    EventRecord, ExportError, MetricRecord, RunEventEmitter, SpanRecord, SpanStatus,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEmitter;

impl RunEventEmitter for TracingEmitter {
    type Error = ExportError;

    fn emit_span(&mut self, span: &SpanRecord) -> Result<(), Self::Error> {
        let duration_ms =
            span.end_unix_nanos.saturating_sub(span.start_unix_nanos) as f64 / 1_000_000.0;
        match span.status {
            SpanStatus::Ok => tracing::info!(
                target: "netwatch::telemetry",
                trace_id = %span.trace_id,
                span_id = %span.span_id,
                duration_ms,
                "span {} ok",
                span.name
            ),
            SpanStatus::Failed => tracing::warn!(
                target: "netwatch::telemetry",
                trace_id = %span.trace_id,
                span_id = %span.span_id,
                duration_ms,
                error = %span.attrs.get("error").map(|v| v.to_string()).unwrap_or_default(),
                "span {} failed",
                span.name
            ),
        }
        Ok(())
    }

    fn emit_event(&mut self, event: &EventRecord) -> Result<(), Self::Error> {
        tracing::debug!(
            target: "netwatch::telemetry",
            trace_id = %event.trace_id,
            attrs = ?event.attrs,
            "event {}",
            event.name
        );
        Ok(())
    }

    fn emit_metric(&mut self, metric: &MetricRecord) -> Result<(), Self::Error> {
        tracing::info!(
            target: "netwatch::telemetry",
            trace_id = %metric.trace_id,
            kind = ?metric.kind,
            "metric {} = {} {}",
            metric.name,
            metric.value,
            metric.unit
        );
        Ok(())
    }
}
