//! OTLP/HTTP exporter for a remote telemetry collector.

use std::fmt;
use std::io;
use std::time::Duration;

use netwatch_core::observe::{EventRecord, ExportError, MetricRecord, RunEventEmitter, SpanRecord};
use serde::Serialize;

use crate::otlp::{OtlpEncoder, LOGS_PATH, METRICS_PATH, TRACES_PATH};

/// The standard OTLP/HTTP receiver on the local host.
pub const DEFAULT_COLLECTOR_ENDPOINT: &str = "http://127.0.0.1:4318";

/// Posts each record to an OTLP/HTTP collector as JSON.
///
/// `endpoint` is the collector base URL; a bare `host:port` is taken as
/// `http://host:port`. Spans, metric samples and events go to the signal
/// paths under it. A record that fails to post is lost; the next one tries
/// again from scratch.
pub struct CollectorEmitter {
    endpoint: String,
    encoder: OtlpEncoder,
    connect_timeout: Duration,
    request_timeout: Duration,
    agent: ureq::Agent,
}

impl fmt::Debug for CollectorEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorEmitter")
            .field("endpoint", &self.endpoint)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl CollectorEmitter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let connect_timeout = Duration::from_millis(500);
        let request_timeout = Duration::from_secs(2);
        Self {
            endpoint: normalize(endpoint.into()),
            encoder: OtlpEncoder::new("netwatch"),
            connect_timeout,
            request_timeout,
            agent: agent(connect_timeout, request_timeout),
        }
    }

    pub fn with_service(mut self, service: &str) -> Self {
        self.encoder = OtlpEncoder::new(service);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self.agent = agent(self.connect_timeout, self.request_timeout);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<(), ExportError> {
        let bytes = serde_json::to_vec(body).map_err(|e| ExportError::Encode(e.to_string()))?;
        let url = format!("{}{}", self.endpoint, path);
        match self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_bytes(&bytes)
        {
            Ok(resp) => {
                // Drain the body so the connection can go back to the pool.
                let _ = resp.into_string();
                Ok(())
            }
            Err(ureq::Error::Status(code, _)) => {
                Err(ExportError::Rejected(format!("{url} answered {code}")))
            }
            Err(ureq::Error::Transport(t)) => {
                Err(ExportError::Io(io::Error::new(io::ErrorKind::Other, t.to_string())))
            }
        }
    }
}

fn agent(connect: Duration, request: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(connect)
        .timeout(request)
        .build()
}

fn normalize(endpoint: String) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

impl RunEventEmitter for CollectorEmitter {
    type Error = ExportError;

    fn emit_span(&mut self, span: &SpanRecord) -> Result<(), Self::Error> {
        self.post(TRACES_PATH, &self.encoder.traces(span))
    }

    fn emit_event(&mut self, event: &EventRecord) -> Result<(), Self::Error> {
        self.post(LOGS_PATH, &self.encoder.logs(event))
    }

    fn emit_metric(&mut self, metric: &MetricRecord) -> Result<(), Self::Error> {
        self.post(METRICS_PATH, &self.encoder.metrics(metric))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    use netwatch_core::observe::{AttrMap, MetricKind, TraceId};

    fn metric(value: f64) -> MetricRecord {
        MetricRecord {
            schema_version: 1,
            ts_unix_nanos: 1,
            trace_id: TraceId::from_bytes([3; 16]),
            name: "packet_usage".to_string(),
            kind: MetricKind::Counter,
            value,
            unit: "packets".to_string(),
            attrs: AttrMap::new(),
        }
    }

    #[test]
    fn bare_host_port_gets_a_scheme() {
        assert_eq!(
            CollectorEmitter::new("collector:4318").endpoint(),
            "http://collector:4318"
        );
        assert_eq!(
            CollectorEmitter::new("https://otel.example/").endpoint(),
            "https://otel.example"
        );
        assert_eq!(
            CollectorEmitter::new(DEFAULT_COLLECTOR_ENDPOINT).endpoint(),
            DEFAULT_COLLECTOR_ENDPOINT
        );
    }

    #[test]
    fn unreachable_collector_is_an_error_not_a_panic() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let mut emitter = CollectorEmitter::new(format!("127.0.0.1:{port}"))
            .with_connect_timeout(Duration::from_millis(100));
        assert!(matches!(
            emitter.emit_metric(&metric(1.0)),
            Err(ExportError::Io(_))
        ));
        assert!(emitter.flush().is_ok());
    }
}
