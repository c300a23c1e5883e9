//! Process-wide telemetry sink.
//!
//! Probes hand records to [`Telemetry`] through an mpsc channel; a single
//! export worker thread owns the backends and is the only place export errors
//! are seen. A dead backend loses its own copy of each record, never a probe's
//! value. A record counts as dropped only when no backend took it.
//!
//! Backends:
//! - [`netwatch_net::collector::CollectorEmitter`] (OTLP/HTTP collector)
//! - [`NdjsonEmitter`] (`spans.ndjson` / `metrics.ndjson` / `events.ndjson`)
//! - [`netwatch_core::telemetry::TracingEmitter`] (log lines)
//!
//! [`MemorySink`] skips the worker entirely and is meant for tests.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use netwatch_core::observe::{
    AttrMap, EventRecord, ExportError, MetricKind, MetricRecord, RunEventEmitter, SpanHandle,
    SpanId, SpanRecord, SpanStatus, TelemetryRecord, TelemetrySink, TraceId, SCHEMA_VERSION_V1,
};
use netwatch_core::telemetry::TracingEmitter;
use netwatch_net::collector::CollectorEmitter;
use netwatch_runtime::Clock;

use crate::config::MonitorConfig;

/// Boxed export backend as stored by the worker.
pub type BoxEmitter = Box<dyn RunEventEmitter<Error = ExportError>>;

enum Command {
    Record(TelemetryRecord),
    Flush(SyncSender<()>),
    Shutdown(SyncSender<()>),
}

#[derive(Debug, Default)]
struct ExportCounters {
    exported: AtomicU64,
    dropped: AtomicU64,
    backend_rejections: AtomicU64,
}

/// Export totals at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportStats {
    /// Records at least one backend accepted.
    pub exported: u64,
    /// Records no backend accepted, or that arrived after shutdown.
    pub dropped: u64,
    /// Individual backend refusals, summed over backends.
    pub backend_rejections: u64,
    /// Whether the worker acknowledged within the timeout.
    pub completed: bool,
}

/// The production sink: stamps records and queues them for export.
pub struct Telemetry {
    trace_id: TraceId,
    clock: Arc<dyn Clock>,
    sequence: AtomicU64,
    tx: Sender<Command>,
    counters: Arc<ExportCounters>,
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("trace_id", &self.trace_id)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl Telemetry {
    pub fn builder(clock: Arc<dyn Clock>) -> TelemetryBuilder {
        TelemetryBuilder {
            label: "netwatch".to_string(),
            clock,
            emitters: Vec::new(),
        }
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn stats(&self) -> ExportStats {
        ExportStats {
            exported: self.counters.exported.load(Ordering::SeqCst),
            dropped: self.counters.dropped.load(Ordering::SeqCst),
            backend_rejections: self.counters.backend_rejections.load(Ordering::SeqCst),
            completed: true,
        }
    }

    /// Wait until everything queued so far has been handed to the backend,
    /// or `timeout` elapses.
    pub fn flush(&self, timeout: Duration) -> ExportStats {
        self.round_trip(Command::Flush, timeout)
    }

    /// Flush and stop the worker. Records arriving afterwards are dropped.
    pub fn shutdown(&self, timeout: Duration) -> ExportStats {
        self.round_trip(Command::Shutdown, timeout)
    }

    fn round_trip(&self, make: fn(SyncSender<()>) -> Command, timeout: Duration) -> ExportStats {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        let completed = self.tx.send(make(ack_tx)).is_ok() && ack_rx.recv_timeout(timeout).is_ok();
        if !completed {
            tracing::debug!(?timeout, "telemetry flush did not complete");
        }
        ExportStats {
            completed,
            ..self.stats()
        }
    }

    fn enqueue(&self, record: TelemetryRecord) {
        if self.tx.send(Command::Record(record)).is_err() {
            self.counters.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl TelemetrySink for Telemetry {
    fn start_span(&self, name: &str) -> SpanHandle {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        SpanHandle::new(
            self.trace_id,
            SpanId::derive(&self.trace_id, name, seq),
            name,
            self.clock.now_unix_nanos(),
        )
    }

    fn end_span(&self, span: SpanHandle, status: SpanStatus) {
        let record = span.close(status, self.clock.now_unix_nanos());
        self.enqueue(TelemetryRecord::Span(record));
    }

    fn record_metric(&self, name: &str, kind: MetricKind, value: f64, unit: &str) {
        self.enqueue(TelemetryRecord::Metric(MetricRecord {
            schema_version: SCHEMA_VERSION_V1,
            ts_unix_nanos: self.clock.now_unix_nanos(),
            trace_id: self.trace_id,
            name: name.to_string(),
            kind,
            value,
            unit: unit.to_string(),
            attrs: AttrMap::new(),
        }));
    }

    fn record_event(&self, name: &str, span: Option<SpanId>, attrs: AttrMap) {
        self.enqueue(TelemetryRecord::Event(EventRecord {
            schema_version: SCHEMA_VERSION_V1,
            ts_unix_nanos: self.clock.now_unix_nanos(),
            trace_id: self.trace_id,
            span_id: span,
            name: name.to_string(),
            attrs,
        }));
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        // Stop the worker without waiting; an explicit `shutdown` is the
        // bounded, acknowledged path.
        let (ack_tx, _ack_rx) = mpsc::sync_channel(1);
        let _ = self.tx.send(Command::Shutdown(ack_tx));
    }
}

/// Assembles a [`Telemetry`] and starts its export worker.
pub struct TelemetryBuilder {
    label: String,
    clock: Arc<dyn Clock>,
    emitters: Vec<(String, BoxEmitter)>,
}

impl TelemetryBuilder {
    /// Label mixed into the trace id.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn emitter<E>(mut self, emitter: E) -> Self
    where
        E: RunEventEmitter<Error = ExportError> + 'static,
    {
        let name = std::any::type_name::<E>();
        let label = name.rsplit("::").next().unwrap_or(name).to_string();
        self.emitters.push((label, Box::new(emitter)));
        self
    }

    pub fn build(self) -> io::Result<Telemetry> {
        let trace_id = TraceId::derive(&self.label, self.clock.now_unix_nanos());
        let (tx, rx) = mpsc::channel();
        let counters = Arc::new(ExportCounters::default());
        let worker_counters = Arc::clone(&counters);
        let emitter = FanoutEmitter::labelled(self.emitters);
        thread::Builder::new()
            .name("netwatch-telemetry".to_string())
            .spawn(move || export_worker(rx, emitter, worker_counters))?;
        Ok(Telemetry {
            trace_id,
            clock: self.clock,
            sequence: AtomicU64::new(0),
            tx,
            counters,
        })
    }
}

/// Build the sink described by `config`: the `tracing` bridge always, plus
/// the collector and NDJSON backends when configured.
pub fn build_telemetry(config: &MonitorConfig, clock: Arc<dyn Clock>) -> io::Result<Telemetry> {
    let mut builder = Telemetry::builder(clock).emitter(TracingEmitter);
    if let Some(endpoint) = &config.collector {
        builder = builder.emitter(CollectorEmitter::new(endpoint.clone()));
    }
    if let Some(dir) = &config.artifact_dir {
        builder = builder.emitter(NdjsonEmitter::create(dir)?);
    }
    builder.build()
}

fn export_worker(rx: Receiver<Command>, mut emitter: FanoutEmitter, counters: Arc<ExportCounters>) {
    while let Ok(first) = rx.recv() {
        let mut next = Some(first);
        // Drain the burst, then flush once.
        while let Some(cmd) = next.take() {
            match cmd {
                Command::Record(record) => {
                    match emitter.emit(&record) {
                        Ok(()) => counters.exported.fetch_add(1, Ordering::SeqCst),
                        Err(e) => {
                            tracing::debug!(error = %e, "no backend took the record, dropped");
                            counters.dropped.fetch_add(1, Ordering::SeqCst)
                        }
                    };
                    counters
                        .backend_rejections
                        .store(emitter.rejections(), Ordering::SeqCst);
                }
                Command::Flush(ack) => {
                    flush_quietly(&mut emitter);
                    let _ = ack.send(());
                }
                Command::Shutdown(ack) => {
                    flush_quietly(&mut emitter);
                    let _ = ack.send(());
                    return;
                }
            }
            next = rx.try_recv().ok();
        }
        flush_quietly(&mut emitter);
    }
}

fn flush_quietly(emitter: &mut FanoutEmitter) {
    if let Err(e) = emitter.flush() {
        tracing::debug!(error = %e, "telemetry flush failed");
    }
}

struct Backend {
    label: String,
    emitter: BoxEmitter,
    failing: bool,
}

/// Forwards every record to each inner emitter.
///
/// A record fails only when every emitter refused it. A single backend going
/// down is logged once at `warn` and again at `info` when it recovers.
pub struct FanoutEmitter {
    backends: Vec<Backend>,
    rejections: u64,
}

impl FanoutEmitter {
    pub fn new(inner: Vec<BoxEmitter>) -> Self {
        Self::labelled(
            inner
                .into_iter()
                .enumerate()
                .map(|(i, emitter)| (format!("emitter#{i}"), emitter))
                .collect(),
        )
    }

    /// Like [`FanoutEmitter::new`], naming each backend in log lines.
    pub fn labelled(inner: Vec<(String, BoxEmitter)>) -> Self {
        Self {
            backends: inner
                .into_iter()
                .map(|(label, emitter)| Backend {
                    label,
                    emitter,
                    failing: false,
                })
                .collect(),
            rejections: 0,
        }
    }

    /// Records refused so far, counted once per refusing backend.
    pub fn rejections(&self) -> u64 {
        self.rejections
    }

    fn each(
        &mut self,
        mut f: impl FnMut(&mut BoxEmitter) -> Result<(), ExportError>,
    ) -> Result<(), ExportError> {
        let mut accepted = self.backends.is_empty();
        let mut last_err = None;
        for backend in &mut self.backends {
            match f(&mut backend.emitter) {
                Ok(()) => {
                    accepted = true;
                    if backend.failing {
                        backend.failing = false;
                        tracing::info!(backend = %backend.label, "telemetry backend recovered");
                    }
                }
                Err(e) => {
                    self.rejections += 1;
                    if backend.failing {
                        tracing::debug!(
                            backend = %backend.label,
                            error = %e,
                            "telemetry record refused"
                        );
                    } else {
                        backend.failing = true;
                        tracing::warn!(
                            backend = %backend.label,
                            error = %e,
                            "telemetry backend failing, its records are dropped"
                        );
                    }
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) if !accepted => Err(e),
            _ => Ok(()),
        }
    }
}

impl RunEventEmitter for FanoutEmitter {
    type Error = ExportError;

    fn emit_span(&mut self, span: &SpanRecord) -> Result<(), Self::Error> {
        self.each(|e| e.emit_span(span))
    }

    fn emit_event(&mut self, event: &EventRecord) -> Result<(), Self::Error> {
        self.each(|e| e.emit_event(event))
    }

    fn emit_metric(&mut self, metric: &MetricRecord) -> Result<(), Self::Error> {
        self.each(|e| e.emit_metric(metric))
    }

    fn emit(&mut self, record: &TelemetryRecord) -> Result<(), Self::Error> {
        self.each(|e| e.emit(record))
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        let mut first_err = None;
        for backend in &mut self.backends {
            if let Err(e) = backend.emitter.flush() {
                tracing::debug!(backend = %backend.label, error = %e, "backend flush failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Appends records as NDJSON lines under one directory.
#[derive(Debug)]
pub struct NdjsonEmitter {
    dir: PathBuf,
    spans: BufWriter<File>,
    events: BufWriter<File>,
    metrics: BufWriter<File>,
}

impl NdjsonEmitter {
    pub const SPANS_FILE: &'static str = "spans.ndjson";
    pub const EVENTS_FILE: &'static str = "events.ndjson";
    pub const METRICS_FILE: &'static str = "metrics.ndjson";

    /// Create `dir` if needed and open the three logs for appending.
    pub fn create(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            spans: open_append(&dir.join(Self::SPANS_FILE))?,
            events: open_append(&dir.join(Self::EVENTS_FILE))?,
            metrics: open_append(&dir.join(Self::METRICS_FILE))?,
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn open_append(path: &Path) -> io::Result<BufWriter<File>> {
    let f = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(f))
}

fn append_line<T: serde::Serialize>(w: &mut BufWriter<File>, value: &T) -> Result<(), ExportError> {
    serde_json::to_writer(&mut *w, value).map_err(|e| ExportError::Encode(e.to_string()))?;
    w.write_all(b"\n")?;
    Ok(())
}

impl RunEventEmitter for NdjsonEmitter {
    type Error = ExportError;

    fn emit_span(&mut self, span: &SpanRecord) -> Result<(), Self::Error> {
        append_line(&mut self.spans, span)
    }

    fn emit_event(&mut self, event: &EventRecord) -> Result<(), Self::Error> {
        append_line(&mut self.events, event)
    }

    fn emit_metric(&mut self, metric: &MetricRecord) -> Result<(), Self::Error> {
        append_line(&mut self.metrics, metric)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.spans.flush()?;
        self.events.flush()?;
        self.metrics.flush()?;
        Ok(())
    }
}

/// Read an NDJSON log back, skipping blank lines.
pub fn read_ndjson<T: serde::de::DeserializeOwned>(path: impl AsRef<Path>) -> io::Result<Vec<T>> {
    let reader = io::BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let v = serde_json::from_str::<T>(&line).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid ndjson at line {}: {}", i + 1, e),
            )
        })?;
        out.push(v);
    }
    Ok(out)
}

/// Keeps every record in memory, synchronously. For tests.
pub struct MemorySink {
    trace_id: TraceId,
    clock: Arc<dyn Clock>,
    sequence: AtomicU64,
    records: Mutex<Vec<TelemetryRecord>>,
}

impl MemorySink {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            trace_id: TraceId::from_bytes([0x42; 16]),
            clock,
            sequence: AtomicU64::new(0),
            records: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, record: TelemetryRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
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

    pub fn events(&self) -> Vec<EventRecord> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                TelemetryRecord::Event(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    /// The closed span named `name`, if exactly one exists.
    pub fn span(&self, name: &str) -> Option<SpanRecord> {
        let mut matches = self.spans().into_iter().filter(|s| s.name == name);
        let first = matches.next()?;
        matches.next().is_none().then_some(first)
    }
}

impl TelemetrySink for MemorySink {
    fn start_span(&self, name: &str) -> SpanHandle {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        SpanHandle::new(
            self.trace_id,
            SpanId::derive(&self.trace_id, name, seq),
            name,
            self.clock.now_unix_nanos(),
        )
    }

    fn end_span(&self, span: SpanHandle, status: SpanStatus) {
        let record = span.close(status, self.clock.now_unix_nanos());
        self.push(TelemetryRecord::Span(record));
    }

    fn record_metric(&self, name: &str, kind: MetricKind, value: f64, unit: &str) {
        self.push(TelemetryRecord::Metric(MetricRecord {
            schema_version: SCHEMA_VERSION_V1,
            ts_unix_nanos: self.clock.now_unix_nanos(),
            trace_id: self.trace_id,
            name: name.to_string(),
            kind,
            value,
            unit: unit.to_string(),
            attrs: AttrMap::new(),
        }));
    }

    fn record_event(&self, name: &str, span: Option<SpanId>, attrs: AttrMap) {
        self.push(TelemetryRecord::Event(EventRecord {
            schema_version: SCHEMA_VERSION_V1,
            ts_unix_nanos: self.clock.now_unix_nanos(),
            trace_id: self.trace_id,
            span_id: span,
            name: name.to_string(),
            attrs,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwatch_net::{CapturingEmitter, FailingEmitter};
    use netwatch_runtime::mock_runtime::ManualClock;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(ManualClock::new(1_000_000).with_step(Duration::from_millis(1)))
    }

    #[test]
    fn exports_spans_and_metrics_in_order() {
        let capture = CapturingEmitter::new();
        let telemetry = Telemetry::builder(clock())
            .emitter(capture.clone())
            .build()
            .unwrap();

        let span = telemetry.start_span("network_latency_measurement");
        telemetry.record_metric("network_latency", MetricKind::Histogram, 12.3, "ms");
        telemetry.end_span(span, SpanStatus::Ok);
        let stats = telemetry.shutdown(Duration::from_secs(5));

        assert!(stats.completed);
        assert_eq!(stats.exported, 2);
        assert_eq!(stats.dropped, 0);
        let spans = capture.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, SpanStatus::Ok);
        assert_eq!(spans[0].trace_id, telemetry.trace_id());
        assert!(spans[0].end_unix_nanos > spans[0].start_unix_nanos);
        assert_eq!(capture.metrics()[0].value, 12.3);
    }

    #[test]
    fn failing_backend_drops_without_surfacing() {
        let failing = FailingEmitter::new();
        let attempts = failing.attempts();
        let telemetry = Telemetry::builder(clock()).emitter(failing).build().unwrap();

        for _ in 0..5 {
            telemetry.record_metric("packet_usage", MetricKind::Counter, 1.0, "packets");
        }
        let stats = telemetry.flush(Duration::from_secs(5));

        assert!(stats.completed);
        assert_eq!(stats.exported, 0);
        assert_eq!(stats.dropped, 5);
        assert_eq!(stats.backend_rejections, 5);
        assert!(attempts.load(Ordering::SeqCst) >= 5);
    }

    #[test]
    fn records_after_shutdown_are_dropped() {
        let telemetry = Telemetry::builder(clock()).build().unwrap();
        assert!(telemetry.shutdown(Duration::from_secs(5)).completed);
        // Give the worker a moment to drop its receiver.
        for _ in 0..100 {
            telemetry.record_metric("late", MetricKind::Counter, 1.0, "n");
            if telemetry.stats().dropped > 0 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(telemetry.stats().dropped > 0);
        assert!(!telemetry.flush(Duration::from_millis(50)).completed);
    }

    fn counter(name: &str) -> TelemetryRecord {
        TelemetryRecord::Metric(MetricRecord {
            schema_version: SCHEMA_VERSION_V1,
            ts_unix_nanos: 1,
            trace_id: TraceId::from_bytes([1; 16]),
            name: name.to_string(),
            kind: MetricKind::Counter,
            value: 1.0,
            unit: "n".to_string(),
            attrs: AttrMap::new(),
        })
    }

    #[test]
    fn fanout_succeeds_while_any_backend_accepts() {
        let capture = CapturingEmitter::new();
        let mut fanout = FanoutEmitter::new(vec![
            Box::new(FailingEmitter::new()),
            Box::new(capture.clone()),
        ]);
        let record = counter("m");

        assert!(fanout.emit(&record).is_ok());
        assert!(fanout.emit(&record).is_ok());
        assert_eq!(capture.records(), vec![record.clone(), record]);
        assert_eq!(fanout.rejections(), 2);
    }

    #[test]
    fn fanout_fails_only_when_every_backend_refuses() {
        let mut fanout = FanoutEmitter::new(vec![
            Box::new(FailingEmitter::new()),
            Box::new(FailingEmitter::new()),
        ]);
        assert!(fanout.emit(&counter("m")).is_err());
        assert_eq!(fanout.rejections(), 2);
        assert!(FanoutEmitter::new(Vec::new()).emit(&counter("m")).is_ok());
    }

    #[test]
    fn one_dead_backend_does_not_drop_records() {
        let capture = CapturingEmitter::new();
        let telemetry = Telemetry::builder(clock())
            .emitter(FailingEmitter::new())
            .emitter(capture.clone())
            .build()
            .unwrap();

        for _ in 0..4 {
            telemetry.record_metric("packet_usage", MetricKind::Counter, 1.0, "packets");
        }
        let stats = telemetry.shutdown(Duration::from_secs(5));

        assert!(stats.completed);
        assert_eq!(stats.exported, 4);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.backend_rejections, 4);
        assert_eq!(capture.metrics().len(), 4);
    }

    #[test]
    fn ndjson_emitter_appends_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = dir.path().join("run");
        let telemetry = Telemetry::builder(clock())
            .emitter(NdjsonEmitter::create(&run_dir).unwrap())
            .build()
            .unwrap();

        let span = telemetry.start_span("packet_usage_measurement");
        telemetry.record_metric("packet_usage", MetricKind::Counter, 350.0, "packets");
        telemetry.end_span(span, SpanStatus::Failed);
        telemetry.record_event("probe_aborted", None, AttrMap::new());
        assert!(telemetry.shutdown(Duration::from_secs(5)).completed);

        let spans: Vec<SpanRecord> = read_ndjson(run_dir.join(NdjsonEmitter::SPANS_FILE)).unwrap();
        let metrics: Vec<MetricRecord> =
            read_ndjson(run_dir.join(NdjsonEmitter::METRICS_FILE)).unwrap();
        let events: Vec<EventRecord> =
            read_ndjson(run_dir.join(NdjsonEmitter::EVENTS_FILE)).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, SpanStatus::Failed);
        assert_eq!(metrics[0].value, 350.0);
        assert_eq!(events[0].name, "probe_aborted");
    }

    #[test]
    fn memory_sink_span_lookup_requires_uniqueness() {
        let sink = MemorySink::new(clock());
        let a = sink.start_span("x");
        let b = sink.start_span("x");
        assert_ne!(a.span_id(), b.span_id());
        sink.end_span(a, SpanStatus::Ok);
        assert!(sink.span("x").is_some());
        sink.end_span(b, SpanStatus::Ok);
        assert!(sink.span("x").is_none());
    }
}
