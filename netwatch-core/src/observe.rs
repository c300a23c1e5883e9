//! Telemetry record schema and the sink contract.
//!
//! Spans, events and metric samples are plain serde records so any backend
//! (OTLP collector, NDJSON files, `tracing`) can consume them. IDs follow W3C
//! Trace Context sizing: 16-byte trace ids and 8-byte span ids.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

/// Error parsing a hex-encoded ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseIdError {
    #[error("invalid id length")]
    InvalidLength,
    #[error("invalid hex in id")]
    InvalidHex,
    /// All-zero IDs are invalid by contract.
    #[error("all-zero id is invalid")]
    AllZeroInvalid,
}

const HEX_LOWER: &[u8; 16] = b"0123456789abcdef";

fn decode_hex_nibble(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn parse_hex_exact<const N: usize>(s: &str) -> Result<[u8; N], ParseIdError> {
    if s.len() != N * 2 {
        return Err(ParseIdError::InvalidLength);
    }
    let bytes = s.as_bytes();
    let mut out = [0u8; N];
    for (i, slot) in out.iter_mut().enumerate() {
        let hi = decode_hex_nibble(bytes[i * 2]).ok_or(ParseIdError::InvalidHex)?;
        let lo = decode_hex_nibble(bytes[i * 2 + 1]).ok_or(ParseIdError::InvalidHex)?;
        *slot = (hi << 4) | lo;
    }
    if out.iter().all(|b| *b == 0) {
        return Err(ParseIdError::AllZeroInvalid);
    }
    Ok(out)
}

fn to_hex_lower(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push(HEX_LOWER[(b >> 4) as usize] as char);
        s.push(HEX_LOWER[(b & 0x0f) as usize] as char);
    }
    s
}

macro_rules! hex_id {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn is_valid(&self) -> bool {
                self.0.iter().any(|b| *b != 0)
            }

            pub fn parse_hex(s: &str) -> Result<Self, ParseIdError> {
                parse_hex_exact::<$len>(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&to_hex_lower(&self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(self, f)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&to_hex_lower(&self.0))
                } else {
                    serializer.serialize_bytes(&self.0)
                }
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                    Self::parse_hex(&s).map_err(serde::de::Error::custom)
                } else {
                    let v = <Vec<u8> as serde::Deserialize>::deserialize(deserializer)?;
                    let bytes: [u8; $len] = v
                        .as_slice()
                        .try_into()
                        .map_err(|_| serde::de::Error::invalid_length(v.len(), &stringify!($len)))?;
                    let id = Self(bytes);
                    if !id.is_valid() {
                        return Err(serde::de::Error::custom(ParseIdError::AllZeroInvalid));
                    }
                    Ok(id)
                }
            }
        }
    };
}

hex_id!(
    /// A 16-byte trace identifier, shared by every span of one monitor run.
    TraceId,
    16
);

hex_id!(
    /// An 8-byte span identifier.
    SpanId,
    8
);

impl TraceId {
    /// Derive a trace id for a run: `sha256(label || start_nanos_be)[0..16]`.
    pub fn derive(label: &str, start_unix_nanos: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(label.as_bytes());
        hasher.update(start_unix_nanos.to_be_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Self(bytes)
    }
}

impl SpanId {
    /// Deterministic span id: `sha256(trace_id || name || sequence_be)[0..8]`.
    pub fn derive(trace_id: &TraceId, name: &str, sequence: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(trace_id.as_bytes());
        hasher.update(name.as_bytes());
        hasher.update(sequence.to_be_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash[..8]);
        Self(bytes)
    }
}

/// Final status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Ok,
    Failed,
}

impl SpanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Ok => "ok",
            SpanStatus::Failed => "failed",
        }
    }
}

/// Aggregation semantics of a metric sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Histogram,
    Counter,
}

/// Attribute values for spans/events/metrics.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Str(String),
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => f.write_str(s),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::I64(v) => write!(f, "{v}"),
            AttrValue::U64(v) => write!(f, "{v}"),
            AttrValue::F64(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        AttrValue::U64(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::I64(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::F64(v)
    }
}

/// Canonical attribute map type (deterministic ordering via BTreeMap).
pub type AttrMap = BTreeMap<String, AttrValue>;

/// A closed span.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SpanRecord {
    pub schema_version: u32,
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    pub start_unix_nanos: u64,
    pub end_unix_nanos: u64,
    pub status: SpanStatus,
    pub attrs: AttrMap,
}

/// A point-in-time event.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EventRecord {
    pub schema_version: u32,
    pub ts_unix_nanos: u64,
    pub trace_id: TraceId,
    pub span_id: Option<SpanId>,
    pub name: String,
    pub attrs: AttrMap,
}

/// A single metric sample.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MetricRecord {
    pub schema_version: u32,
    pub ts_unix_nanos: u64,
    pub trace_id: TraceId,
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
    pub unit: String,
    pub attrs: AttrMap,
}

pub const SCHEMA_VERSION_V1: u32 = 1;

/// A backend refused or failed to take a record.
///
/// Only ever seen inside the sink; callers of [`TelemetrySink`] never get it.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("export i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode record: {0}")]
    Encode(String),
    #[error("collector rejected record: {0}")]
    Rejected(String),
}

/// Any record a sink can export.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryRecord {
    Span(SpanRecord),
    Event(EventRecord),
    Metric(MetricRecord),
}

/// An export backend for telemetry records.
///
/// Implementations may block (sockets, files); the sink calls them from its
/// export worker, never from a probe.
pub trait RunEventEmitter: Send {
    type Error;

    fn emit_span(&mut self, span: &SpanRecord) -> Result<(), Self::Error>;
    fn emit_event(&mut self, event: &EventRecord) -> Result<(), Self::Error>;
    fn emit_metric(&mut self, metric: &MetricRecord) -> Result<(), Self::Error>;

    /// Push buffered output to the backend.
    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn emit(&mut self, record: &TelemetryRecord) -> Result<(), Self::Error> {
        match record {
            TelemetryRecord::Span(s) => self.emit_span(s),
            TelemetryRecord::Event(e) => self.emit_event(e),
            TelemetryRecord::Metric(m) => self.emit_metric(m),
        }
    }
}

/// An open span.
///
/// Not `Clone`: [`TelemetrySink::end_span`] takes it by value, so a span can
/// only be closed once.
#[derive(Debug)]
#[must_use = "spans must be closed with `TelemetrySink::end_span`"]
pub struct SpanHandle {
    trace_id: TraceId,
    span_id: SpanId,
    parent_span_id: Option<SpanId>,
    name: String,
    start_unix_nanos: u64,
    attrs: AttrMap,
}

impl SpanHandle {
    pub fn new(trace_id: TraceId, span_id: SpanId, name: &str, start_unix_nanos: u64) -> Self {
        Self {
            trace_id,
            span_id,
            parent_span_id: None,
            name: name.to_string(),
            start_unix_nanos,
            attrs: AttrMap::new(),
        }
    }

    pub fn with_parent(mut self, parent: SpanId) -> Self {
        self.parent_span_id = Some(parent);
        self
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<AttrValue>) {
        self.attrs.insert(key.to_string(), value.into());
    }

    /// Consume the handle into its closed record.
    pub fn close(self, status: SpanStatus, end_unix_nanos: u64) -> SpanRecord {
        SpanRecord {
            schema_version: SCHEMA_VERSION_V1,
            trace_id: self.trace_id,
            span_id: self.span_id,
            parent_span_id: self.parent_span_id,
            name: self.name,
            start_unix_nanos: self.start_unix_nanos,
            end_unix_nanos: end_unix_nanos.max(self.start_unix_nanos),
            status,
            attrs: self.attrs,
        }
    }
}

/// Process-wide destination for spans and metric samples.
///
/// No method can fail: a backend outage turns into dropped samples inside the
/// sink and never reaches the caller.
pub trait TelemetrySink: Send + Sync {
    fn start_span(&self, name: &str) -> SpanHandle;

    /// Open a span nested under `parent` when one is given.
    fn start_child_span(&self, name: &str, parent: Option<SpanId>) -> SpanHandle {
        let span = self.start_span(name);
        match parent {
            Some(parent) => span.with_parent(parent),
            None => span,
        }
    }

    fn end_span(&self, span: SpanHandle, status: SpanStatus);

    fn record_metric(&self, name: &str, kind: MetricKind, value: f64, unit: &str);

    fn record_event(&self, _name: &str, _span: Option<SpanId>, _attrs: AttrMap) {}
}

/// An open span that closes itself.
///
/// [`SpanGuard::end`] closes with the given status. If the guard is dropped
/// first (early return, cancellation, unwinding), the span is closed as
/// `failed` with an `error` attribute.
pub struct SpanGuard<'a> {
    sink: &'a dyn TelemetrySink,
    trace_id: TraceId,
    span_id: SpanId,
    handle: Option<SpanHandle>,
}

impl<'a> SpanGuard<'a> {
    pub fn start(sink: &'a dyn TelemetrySink, name: &str, parent: Option<SpanId>) -> Self {
        let handle = sink.start_child_span(name, parent);
        Self {
            sink,
            trace_id: handle.trace_id(),
            span_id: handle.span_id(),
            handle: Some(handle),
        }
    }

    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<AttrValue>) {
        if let Some(handle) = self.handle.as_mut() {
            handle.set_attr(key, value);
        }
    }

    pub fn end(mut self, status: SpanStatus) {
        if let Some(handle) = self.handle.take() {
            self.sink.end_span(handle, status);
        }
    }
}

impl fmt::Debug for SpanGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanGuard")
            .field("span_id", &self.span_id)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Drop for SpanGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.set_attr("error", "span abandoned before completion");
            self.sink.end_span(handle, SpanStatus::Failed);
        }
    }
}

/// A sink that discards everything.
#[derive(Debug)]
pub struct NoopSink {
    trace_id: TraceId,
    sequence: AtomicU64,
}

impl NoopSink {
    pub fn new() -> Self {
        Self {
            trace_id: TraceId::from_bytes([0xff; 16]),
            sequence: AtomicU64::new(0),
        }
    }
}

impl Default for NoopSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySink for NoopSink {
    fn start_span(&self, name: &str) -> SpanHandle {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        SpanHandle::new(self.trace_id, SpanId::derive(&self.trace_id, name, seq), name, 0)
    }

    fn end_span(&self, _span: SpanHandle, _status: SpanStatus) {}

    fn record_metric(&self, _name: &str, _kind: MetricKind, _value: f64, _unit: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_id_hex_roundtrip() {
        let id = TraceId::from_bytes([0x11u8; 16]);
        let parsed = TraceId::parse_hex(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn all_zero_invalid() {
        assert_eq!(
            TraceId::parse_hex("00000000000000000000000000000000").unwrap_err(),
            ParseIdError::AllZeroInvalid
        );
        assert_eq!(
            SpanId::parse_hex("0000000000000000").unwrap_err(),
            ParseIdError::AllZeroInvalid
        );
    }

    #[test]
    fn invalid_length_and_hex_rejected() {
        assert_eq!(
            SpanId::parse_hex("abcd").unwrap_err(),
            ParseIdError::InvalidLength
        );
        assert_eq!(
            SpanId::parse_hex("zzzzzzzzzzzzzzzz").unwrap_err(),
            ParseIdError::InvalidHex
        );
    }

    #[test]
    fn derived_span_ids_are_stable() {
        let trace = TraceId::derive("netwatch", 1_000);
        assert_eq!(
            SpanId::derive(&trace, "probe", 1),
            SpanId::derive(&trace, "probe", 1)
        );
        assert_ne!(
            SpanId::derive(&trace, "probe", 1),
            SpanId::derive(&trace, "probe", 2)
        );
        assert_ne!(TraceId::derive("a", 1), TraceId::derive("a", 2));
    }

    #[test]
    fn span_record_serializes_ids_as_hex() {
        let trace = TraceId::from_bytes([0xab; 16]);
        let mut handle = SpanHandle::new(trace, SpanId::from_bytes([0x01; 8]), "s", 10);
        handle.set_attr("target", "example.com");
        let record = handle.close(SpanStatus::Ok, 20);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["trace_id"], "abababababababababababababababab");
        assert_eq!(json["status"], "ok");
        assert_eq!(json["attrs"]["target"], "example.com");

        let back: SpanRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[derive(Default)]
    struct Closed(std::sync::Mutex<Vec<(String, Option<SpanId>, SpanStatus)>>);

    impl TelemetrySink for Closed {
        fn start_span(&self, name: &str) -> SpanHandle {
            let trace = TraceId::from_bytes([2; 16]);
            SpanHandle::new(trace, SpanId::derive(&trace, name, 0), name, 1)
        }

        fn end_span(&self, span: SpanHandle, status: SpanStatus) {
            let record = span.close(status, 2);
            self.0
                .lock()
                .unwrap()
                .push((record.name, record.parent_span_id, record.status));
        }

        fn record_metric(&self, _name: &str, _kind: MetricKind, _value: f64, _unit: &str) {}
    }

    #[test]
    fn guard_closes_exactly_once() {
        let sink = Closed::default();
        let parent = SpanId::from_bytes([7; 8]);

        let guard = SpanGuard::start(&sink, "ok", Some(parent));
        guard.end(SpanStatus::Ok);
        drop(SpanGuard::start(&sink, "abandoned", None));

        let closed = sink.0.lock().unwrap().clone();
        assert_eq!(
            closed,
            vec![
                ("ok".to_string(), Some(parent), SpanStatus::Ok),
                ("abandoned".to_string(), None, SpanStatus::Failed),
            ]
        );
    }

    #[test]
    fn guard_closes_during_unwind() {
        let sink = Closed::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _span = SpanGuard::start(&sink, "panics", None);
            panic!("boom");
        }));
        assert!(result.is_err());
        let closed = sink.0.lock().unwrap().clone();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].2, SpanStatus::Failed);
    }

    #[test]
    fn close_never_ends_before_start() {
        let handle = SpanHandle::new(
            TraceId::from_bytes([1; 16]),
            SpanId::from_bytes([1; 8]),
            "s",
            50,
        );
        assert_eq!(handle.close(SpanStatus::Failed, 10).end_unix_nanos, 50);
    }
}
