//! Runs a fixed set of probes and freezes their results into a [`Report`].
//!
//! Every probe runs on its own tokio task in both modes, so a probe that
//! panics costs its own value and nothing else:
//! - `Sequential`: spawn, await, then the next probe
//! - `Concurrent`: spawn all, then await the handles in configuration order
//!
//! Probe spans are children of the run's `monitor_run` span.

use std::collections::BTreeSet;
use std::sync::Arc;

use netwatch_core::measure::Measurement;
use netwatch_core::observe::{AttrMap, AttrValue, SpanGuard, SpanId, SpanStatus, TelemetrySink};
use netwatch_runtime::Clock;
use tokio::task::{JoinError, JoinHandle};

use crate::config::{ExecutionMode, MonitorConfig};
use crate::probe::{build_probes, Probe};
use crate::report::Report;
use crate::Error;

/// Name of the span covering a whole run.
pub const RUN_SPAN: &str = "monitor_run";

pub struct Orchestrator {
    probes: Vec<Arc<dyn Probe>>,
    mode: ExecutionMode,
    sink: Arc<dyn TelemetrySink>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.probes.iter().map(|p| p.name()).collect();
        f.debug_struct("Orchestrator")
            .field("probes", &names)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Probe names must be unique; they key the report.
    pub fn new(
        probes: Vec<Box<dyn Probe>>,
        sink: Arc<dyn TelemetrySink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Error> {
        let mut seen = BTreeSet::new();
        for probe in &probes {
            if !seen.insert(probe.name().to_string()) {
                return Err(Error::DuplicateProbe(probe.name().to_string()));
            }
        }
        Ok(Self {
            probes: probes.into_iter().map(Arc::from).collect(),
            mode: ExecutionMode::default(),
            sink,
            clock,
        })
    }

    /// The standard latency + packet-usage pipeline for `config`.
    pub fn from_config(
        config: &MonitorConfig,
        sink: Arc<dyn TelemetrySink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Error> {
        let probes = build_probes(config, Arc::clone(&sink), Arc::clone(&clock));
        Ok(Self::new(probes, sink, clock)?.with_mode(config.mode))
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn probe_names(&self) -> Vec<&str> {
        self.probes.iter().map(|p| p.name()).collect()
    }

    /// Run every probe once. Always returns a report listing every probe.
    pub async fn run(&self) -> Report {
        let mut span = SpanGuard::start(self.sink.as_ref(), RUN_SPAN, None);
        span.set_attr("mode", self.mode.as_str());
        let run_span_id = span.span_id();
        let trace_id = span.trace_id();
        let started = self.clock.now_unix_nanos();
        tracing::info!(
            trace_id = %trace_id,
            mode = %self.mode,
            probes = self.probes.len(),
            "monitor run started"
        );

        let outcomes = match self.mode {
            ExecutionMode::Sequential => {
                let mut outcomes = Vec::with_capacity(self.probes.len());
                for probe in &self.probes {
                    outcomes.push(spawn_probe(probe, run_span_id).await);
                }
                outcomes
            }
            ExecutionMode::Concurrent => {
                let handles: Vec<JoinHandle<Measurement>> = self
                    .probes
                    .iter()
                    .map(|probe| spawn_probe(probe, run_span_id))
                    .collect();
                let mut outcomes = Vec::with_capacity(handles.len());
                for handle in handles {
                    outcomes.push(handle.await);
                }
                outcomes
            }
        };

        let results: Vec<Measurement> = self
            .probes
            .iter()
            .zip(outcomes)
            .map(|(probe, outcome)| match outcome {
                Ok(mut m) => {
                    m.name = probe.name().to_string();
                    m
                }
                Err(e) => self.aborted(probe.as_ref(), e, run_span_id),
            })
            .collect();

        let failed = results.iter().filter(|m| !m.is_success()).count();
        span.set_attr("probes_total", results.len() as u64);
        span.set_attr("probes_failed", failed as u64);
        let status = if failed == 0 {
            SpanStatus::Ok
        } else {
            SpanStatus::Failed
        };
        span.end(status);
        let finished = self.clock.now_unix_nanos();
        tracing::info!(
            trace_id = %trace_id,
            probes = results.len(),
            failed,
            "monitor run finished"
        );

        Report::new(trace_id, run_span_id, started, finished, results)
    }

    fn aborted(&self, probe: &dyn Probe, err: JoinError, run_span: SpanId) -> Measurement {
        let reason = if err.is_panic() {
            "probe panicked"
        } else {
            "probe cancelled"
        };
        tracing::warn!(probe = probe.name(), reason, "probe task aborted");
        let mut attrs = AttrMap::new();
        attrs.insert("probe".to_string(), AttrValue::from(probe.name()));
        attrs.insert("reason".to_string(), AttrValue::from(reason));
        self.sink.record_event("probe_aborted", Some(run_span), attrs);
        Measurement::failed(
            probe.name(),
            probe.unit(),
            self.clock.now_unix_nanos(),
            reason,
        )
    }
}

fn spawn_probe(probe: &Arc<dyn Probe>, run_span: SpanId) -> JoinHandle<Measurement> {
    let probe = Arc::clone(probe);
    tokio::spawn(async move { probe.run(Some(run_span)).await })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use netwatch_core::observe::NoopSink;
    use netwatch_runtime::mock_runtime::ManualClock;

    use crate::sink::MemorySink;

    struct Fixed(&'static str, Option<f64>);

    #[async_trait]
    impl Probe for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn unit(&self) -> &str {
            "u"
        }

        async fn run(&self, _parent: Option<SpanId>) -> Measurement {
            match self.1 {
                Some(v) => Measurement::success("renamed", v, "u", 1),
                None => Measurement::failed(self.0, "u", 1, "stub failure"),
            }
        }
    }

    /// Opens its span, then panics mid-measurement.
    struct Panics(Arc<dyn TelemetrySink>);

    #[async_trait]
    impl Probe for Panics {
        fn name(&self) -> &str {
            "explodes"
        }

        fn unit(&self) -> &str {
            "u"
        }

        async fn run(&self, parent: Option<SpanId>) -> Measurement {
            let _span = SpanGuard::start(self.0.as_ref(), "explodes_measurement", parent);
            panic!("measurement bug")
        }
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(ManualClock::new(5_000).with_step(Duration::from_micros(1)))
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = Orchestrator::new(
            vec![Box::new(Fixed("a", Some(1.0))) as Box<dyn Probe>, Box::new(Fixed("a", None))],
            Arc::new(NoopSink::new()),
            clock(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateProbe(name) if name == "a"));
    }

    #[tokio::test]
    async fn report_keys_follow_probe_names() {
        let orch = Orchestrator::new(
            vec![
                Box::new(Fixed("a", Some(1.0))) as Box<dyn Probe>,
                Box::new(Fixed("b", Some(2.0))),
            ],
            Arc::new(NoopSink::new()),
            clock(),
        )
        .unwrap();
        let report = orch.run().await;
        assert_eq!(report.names(), vec!["a", "b"]);
        assert_eq!(report.value("a"), Some(1.0));
    }

    #[tokio::test]
    async fn run_span_fails_when_any_probe_fails() {
        let clock = clock();
        let sink = Arc::new(MemorySink::new(Arc::clone(&clock)));
        let orch = Orchestrator::new(
            vec![Box::new(Fixed("a", Some(1.0))) as Box<dyn Probe>, Box::new(Fixed("b", None))],
            sink.clone(),
            clock,
        )
        .unwrap();
        let report = orch.run().await;
        let span = sink.span(RUN_SPAN).unwrap();
        assert_eq!(span.status, SpanStatus::Failed);
        assert_eq!(span.span_id, report.run_span_id());
        assert_eq!(span.attrs.get("probes_failed"), Some(&AttrValue::U64(1)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_probe_becomes_absent_value() {
        for mode in [ExecutionMode::Sequential, ExecutionMode::Concurrent] {
            let clock = clock();
            let sink = Arc::new(MemorySink::new(Arc::clone(&clock)));
            let orch = Orchestrator::new(
                vec![
                    Box::new(Panics(sink.clone())) as Box<dyn Probe>,
                    Box::new(Fixed("after", Some(3.0))),
                ],
                sink.clone(),
                clock,
            )
            .unwrap()
            .with_mode(mode);
            let report = orch.run().await;
            assert_eq!(report.names(), vec!["explodes", "after"]);
            assert_eq!(report.value("explodes"), None);
            assert_eq!(report.value("after"), Some(3.0));
            assert_eq!(sink.events()[0].name, "probe_aborted");

            let exploded: Vec<_> = sink
                .spans()
                .into_iter()
                .filter(|s| s.name == "explodes_measurement")
                .collect();
            assert_eq!(exploded.len(), 1, "{mode}");
            assert_eq!(exploded[0].status, SpanStatus::Failed);
            assert_eq!(exploded[0].parent_span_id, Some(report.run_span_id()));
        }
    }
}
