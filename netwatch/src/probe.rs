//! Probes: one traced facility invocation each.
//!
//! A probe never returns an error. Whatever goes wrong between invoking the
//! facility and parsing its output ends up as a [`Measurement`] with no value,
//! a `failed` span, and a `warn` log line.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netwatch_core::measure::Measurement;
use netwatch_core::observe::{MetricKind, SpanGuard, SpanId, SpanStatus, TelemetrySink};
use netwatch_core::parse::{self, PacketCounters, ParseError};
use netwatch_net::facility::{CommandFacility, Facility, FacilityOutput, ProcNetDevFacility};
use netwatch_net::FacilityError;
use netwatch_runtime::Clock;

use crate::config::{MonitorConfig, PacketSource};

pub const LATENCY_PROBE: &str = "network_latency";
pub const PACKET_USAGE_PROBE: &str = "packet_usage";

/// A named measurement source.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Name used as the report key.
    fn name(&self) -> &str;

    fn unit(&self) -> &str;

    /// Measure once. Failures are folded into the returned measurement.
    ///
    /// Spans the probe opens are nested under `parent` when one is given.
    async fn run(&self, parent: Option<SpanId>) -> Measurement;
}

/// Why a probe produced no value.
#[derive(Debug, thiserror::Error)]
pub enum ProbeFailure {
    #[error(transparent)]
    FacilityUnavailable(#[from] FacilityError),
    #[error("unparseable output: {0}")]
    ParseFailure(#[from] ParseError),
}

impl ProbeFailure {
    /// Short stable label recorded as the span's `error.kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeFailure::FacilityUnavailable(FacilityError::TimedOut(_)) => "timed_out",
            ProbeFailure::FacilityUnavailable(_) => "facility_unavailable",
            ProbeFailure::ParseFailure(_) => "parse_failure",
        }
    }
}

/// Turns raw facility output into a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    /// Round-trip time in ms from ping output
    PingLatency,
    /// Sent + received from `netstat -s`
    NetstatPackets,
    /// Sent + received from a `/proc/net/dev` table
    ProcNetDev { include_loopback: bool },
}

impl Extractor {
    pub fn extract(&self, output: &FacilityOutput) -> Result<f64, ParseError> {
        match (self, output) {
            (Extractor::PingLatency, FacilityOutput::Text(text)) => parse::parse_ping_latency(text),
            (Extractor::PingLatency, FacilityOutput::Counters(_)) => {
                Err(ParseError::UnexpectedOutput {
                    expected: "ping text",
                })
            }
            (_, FacilityOutput::Counters(c)) => Ok(packets(*c)),
            (Extractor::NetstatPackets, FacilityOutput::Text(text)) => {
                parse::parse_netstat_packets(text).map(packets)
            }
            (Extractor::ProcNetDev { include_loopback }, FacilityOutput::Text(text)) => {
                parse::parse_proc_net_dev(text, *include_loopback).map(packets)
            }
        }
    }
}

fn packets(c: PacketCounters) -> f64 {
    c.total() as f64
}

/// A probe built from a facility and an extraction rule.
pub struct MeasurementProbe {
    name: String,
    unit: String,
    kind: MetricKind,
    facility: Box<dyn Facility>,
    extractor: Extractor,
    timeout: Duration,
    sink: Arc<dyn TelemetrySink>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for MeasurementProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeasurementProbe")
            .field("name", &self.name)
            .field("facility", &self.facility.describe())
            .field("extractor", &self.extractor)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl MeasurementProbe {
    /// Generic constructor; the probe name doubles as its metric name.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        unit: impl Into<String>,
        kind: MetricKind,
        facility: Box<dyn Facility>,
        extractor: Extractor,
        timeout: Duration,
        sink: Arc<dyn TelemetrySink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            kind,
            facility,
            extractor,
            timeout,
            sink,
            clock,
        }
    }

    /// `network_latency`: histogram of ping round-trip time in ms.
    pub fn latency(
        facility: Box<dyn Facility>,
        timeout: Duration,
        sink: Arc<dyn TelemetrySink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            LATENCY_PROBE,
            "ms",
            MetricKind::Histogram,
            facility,
            Extractor::PingLatency,
            timeout,
            sink,
            clock,
        )
    }

    /// `packet_usage`: counter of packets sent plus received.
    pub fn packet_usage(
        facility: Box<dyn Facility>,
        extractor: Extractor,
        timeout: Duration,
        sink: Arc<dyn TelemetrySink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            PACKET_USAGE_PROBE,
            "packets",
            MetricKind::Counter,
            facility,
            extractor,
            timeout,
            sink,
            clock,
        )
    }

    pub fn extractor(&self) -> Extractor {
        self.extractor
    }

    async fn measure(&self) -> Result<f64, ProbeFailure> {
        let output = tokio::time::timeout(self.timeout, self.facility.invoke())
            .await
            .map_err(|_| FacilityError::TimedOut(self.timeout))??;
        Ok(self.extractor.extract(&output)?)
    }
}

#[async_trait]
impl Probe for MeasurementProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn unit(&self) -> &str {
        &self.unit
    }

    async fn run(&self, parent: Option<SpanId>) -> Measurement {
        let span_name = format!("{}_measurement", self.name);
        let mut span = SpanGuard::start(self.sink.as_ref(), &span_name, parent);
        span.set_attr("probe", self.name.as_str());
        span.set_attr("facility", self.facility.describe());

        let outcome = self.measure().await;
        let ts = self.clock.now_unix_nanos();
        match outcome {
            Ok(value) => {
                self.sink.record_metric(&self.name, self.kind, value, &self.unit);
                span.set_attr("value", value);
                span.end(SpanStatus::Ok);
                tracing::debug!(probe = %self.name, value, unit = %self.unit, "probe succeeded");
                Measurement::success(&self.name, value, &self.unit, ts)
            }
            Err(failure) => {
                span.set_attr("error", failure.to_string());
                span.set_attr("error.kind", failure.kind());
                span.end(SpanStatus::Failed);
                tracing::warn!(
                    probe = %self.name,
                    kind = failure.kind(),
                    error = %failure,
                    "probe failed, no value obtained"
                );
                Measurement::failed(&self.name, &self.unit, ts, failure)
            }
        }
    }
}

/// The latency and packet-usage probes described by `config`, in that order.
pub fn build_probes(
    config: &MonitorConfig,
    sink: Arc<dyn TelemetrySink>,
    clock: Arc<dyn Clock>,
) -> Vec<Box<dyn Probe>> {
    let latency = MeasurementProbe::latency(
        Box::new(CommandFacility::ping(
            &config.target,
            config.ping_samples,
            config.ping_count_flag(),
        )),
        config.probe_timeout(),
        Arc::clone(&sink),
        Arc::clone(&clock),
    );
    let (facility, extractor): (Box<dyn Facility>, Extractor) = match config.packet_source {
        PacketSource::ProcNetDev => (
            Box::new(ProcNetDevFacility::new()),
            Extractor::ProcNetDev {
                include_loopback: config.include_loopback,
            },
        ),
        PacketSource::Netstat => (Box::new(CommandFacility::netstat()), Extractor::NetstatPackets),
    };
    let packets =
        MeasurementProbe::packet_usage(facility, extractor, config.probe_timeout(), sink, clock);
    let probes: Vec<Box<dyn Probe>> = vec![Box::new(latency), Box::new(packets)];
    probes
}
