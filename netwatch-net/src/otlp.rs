//! OTLP/HTTP JSON encoding of telemetry records.
//!
//! Field names follow the protobuf JSON mapping that OTLP collectors accept:
//! lowerCamelCase keys, hex trace and span ids, 64-bit integers as decimal
//! strings. Spans go to [`TRACES_PATH`], metric samples to [`METRICS_PATH`]
//! and events to [`LOGS_PATH`] as log records.

use netwatch_core::observe::{
    AttrMap, AttrValue, EventRecord, MetricKind, MetricRecord, SpanRecord, SpanStatus,
};
use serde::Serialize;

pub const TRACES_PATH: &str = "/v1/traces";
pub const METRICS_PATH: &str = "/v1/metrics";
pub const LOGS_PATH: &str = "/v1/logs";

const SPAN_KIND_INTERNAL: u8 = 1;
const STATUS_CODE_OK: u8 = 1;
const STATUS_CODE_ERROR: u8 = 2;
const TEMPORALITY_DELTA: u8 = 1;
const TEMPORALITY_CUMULATIVE: u8 = 2;
const SEVERITY_INFO: u8 = 9;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: AnyValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AnyValue {
    StringValue(String),
    BoolValue(bool),
    IntValue(String),
    DoubleValue(f64),
}

impl From<&AttrValue> for AnyValue {
    fn from(value: &AttrValue) -> Self {
        match value {
            AttrValue::Str(s) => AnyValue::StringValue(s.clone()),
            AttrValue::Bool(b) => AnyValue::BoolValue(*b),
            AttrValue::I64(v) => AnyValue::IntValue(v.to_string()),
            AttrValue::U64(v) => AnyValue::IntValue(v.to_string()),
            AttrValue::F64(v) => AnyValue::DoubleValue(*v),
        }
    }
}

fn attributes(attrs: &AttrMap) -> Vec<KeyValue> {
    attrs
        .iter()
        .map(|(k, v)| KeyValue::new(k.as_str(), AnyValue::from(v)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scope {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTraceRequest {
    pub resource_spans: Vec<ResourceSpans>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpans {
    pub resource: Resource,
    pub scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeSpans {
    pub scope: Scope,
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub parent_span_id: String,
    pub name: String,
    pub kind: u8,
    pub start_time_unix_nano: String,
    pub end_time_unix_nano: String,
    pub attributes: Vec<KeyValue>,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub code: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetricsRequest {
    pub resource_metrics: Vec<ResourceMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetrics {
    pub resource: Resource,
    pub scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeMetrics {
    pub scope: Scope,
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub name: String,
    pub unit: String,
    #[serde(flatten)]
    pub data: MetricData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricData {
    Sum(Sum),
    Histogram(Histogram),
}

/// Counters are totals read from the OS, so they are cumulative.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sum {
    pub data_points: Vec<NumberDataPoint>,
    pub aggregation_temporality: u8,
    pub is_monotonic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberDataPoint {
    pub attributes: Vec<KeyValue>,
    pub time_unix_nano: String,
    pub as_double: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Histogram {
    pub data_points: Vec<HistogramDataPoint>,
    pub aggregation_temporality: u8,
}

/// One observation per point; the collector aggregates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramDataPoint {
    pub attributes: Vec<KeyValue>,
    pub time_unix_nano: String,
    pub count: String,
    pub sum: f64,
    pub bucket_counts: Vec<String>,
    pub explicit_bounds: Vec<f64>,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportLogsRequest {
    pub resource_logs: Vec<ResourceLogs>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLogs {
    pub resource: Resource,
    pub scope_logs: Vec<ScopeLogs>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeLogs {
    pub scope: Scope,
    pub log_records: Vec<LogRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub time_unix_nano: String,
    pub severity_number: u8,
    pub severity_text: String,
    pub body: AnyValue,
    pub attributes: Vec<KeyValue>,
    pub trace_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub span_id: String,
}

/// Wraps single records in OTLP export requests for one service.
#[derive(Debug, Clone)]
pub struct OtlpEncoder {
    resource: Resource,
    scope: Scope,
}

impl OtlpEncoder {
    pub fn new(service: &str) -> Self {
        Self {
            resource: Resource {
                attributes: vec![KeyValue::new(
                    "service.name",
                    AnyValue::StringValue(service.to_string()),
                )],
            },
            scope: Scope {
                name: "netwatch".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    pub fn traces(&self, span: &SpanRecord) -> ExportTraceRequest {
        let status = match span.status {
            SpanStatus::Ok => Status {
                message: String::new(),
                code: STATUS_CODE_OK,
            },
            SpanStatus::Failed => Status {
                message: span
                    .attrs
                    .get("error")
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
                code: STATUS_CODE_ERROR,
            },
        };
        let otlp = Span {
            trace_id: span.trace_id.to_string(),
            span_id: span.span_id.to_string(),
            parent_span_id: span
                .parent_span_id
                .map(|p| p.to_string())
                .unwrap_or_default(),
            name: span.name.clone(),
            kind: SPAN_KIND_INTERNAL,
            start_time_unix_nano: span.start_unix_nanos.to_string(),
            end_time_unix_nano: span.end_unix_nanos.to_string(),
            attributes: attributes(&span.attrs),
            status,
        };
        ExportTraceRequest {
            resource_spans: vec![ResourceSpans {
                resource: self.resource.clone(),
                scope_spans: vec![ScopeSpans {
                    scope: self.scope.clone(),
                    spans: vec![otlp],
                }],
            }],
        }
    }

    pub fn metrics(&self, metric: &MetricRecord) -> ExportMetricsRequest {
        let mut attrs = attributes(&metric.attrs);
        attrs.push(KeyValue::new(
            "trace_id",
            AnyValue::StringValue(metric.trace_id.to_string()),
        ));
        let time_unix_nano = metric.ts_unix_nanos.to_string();
        let data = match metric.kind {
            MetricKind::Counter => MetricData::Sum(Sum {
                data_points: vec![NumberDataPoint {
                    attributes: attrs,
                    time_unix_nano,
                    as_double: metric.value,
                }],
                aggregation_temporality: TEMPORALITY_CUMULATIVE,
                is_monotonic: true,
            }),
            MetricKind::Histogram => MetricData::Histogram(Histogram {
                data_points: vec![HistogramDataPoint {
                    attributes: attrs,
                    time_unix_nano,
                    count: "1".to_string(),
                    sum: metric.value,
                    bucket_counts: vec!["1".to_string()],
                    explicit_bounds: Vec::new(),
                    min: metric.value,
                    max: metric.value,
                }],
                aggregation_temporality: TEMPORALITY_DELTA,
            }),
        };
        ExportMetricsRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: self.resource.clone(),
                scope_metrics: vec![ScopeMetrics {
                    scope: self.scope.clone(),
                    metrics: vec![Metric {
                        name: metric.name.clone(),
                        unit: metric.unit.clone(),
                        data,
                    }],
                }],
            }],
        }
    }

    pub fn logs(&self, event: &EventRecord) -> ExportLogsRequest {
        let record = LogRecord {
            time_unix_nano: event.ts_unix_nanos.to_string(),
            severity_number: SEVERITY_INFO,
            severity_text: "INFO".to_string(),
            body: AnyValue::StringValue(event.name.clone()),
            attributes: attributes(&event.attrs),
            trace_id: event.trace_id.to_string(),
            span_id: event.span_id.map(|s| s.to_string()).unwrap_or_default(),
        };
        ExportLogsRequest {
            resource_logs: vec![ResourceLogs {
                resource: self.resource.clone(),
                scope_logs: vec![ScopeLogs {
                    scope: self.scope.clone(),
                    log_records: vec![record],
                }],
            }],
        }
    }
}
