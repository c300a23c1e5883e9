//! Dry Run Example
//!
//! Runs both probes against canned facility output, so nothing is pinged
//! and no OS counters are read. The latency stub returns nothing to show how
//! a failed probe appears in the report.

use std::sync::Arc;
use std::time::Duration;

use netwatch::core::observe::MetricKind;
use netwatch::core::telemetry::TracingEmitter;
use netwatch::net::StaticFacility;
use netwatch::prelude::*;
use netwatch::probe::{Extractor, MeasurementProbe};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .init();

    println!("netwatch dry run");
    println!("================");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let telemetry = Arc::new(
        Telemetry::builder(Arc::clone(&clock))
            .label("dry-run")
            .emitter(TracingEmitter)
            .build()?,
    );
    let timeout = Duration::from_secs(1);

    let latency = MeasurementProbe::latency(
        Box::new(StaticFacility::text("")),
        timeout,
        telemetry.clone(),
        Arc::clone(&clock),
    );
    let packets = MeasurementProbe::packet_usage(
        Box::new(StaticFacility::counters(100, 250)),
        Extractor::NetstatPackets,
        timeout,
        telemetry.clone(),
        Arc::clone(&clock),
    );
    let rtt = MeasurementProbe::new(
        "loopback_rtt",
        "ms",
        MetricKind::Histogram,
        Box::new(StaticFacility::text("reply from 127.0.0.1: time<1ms")),
        Extractor::PingLatency,
        timeout,
        telemetry.clone(),
        Arc::clone(&clock),
    );

    let probes: Vec<Box<dyn Probe>> = vec![Box::new(latency), Box::new(packets), Box::new(rtt)];
    let orchestrator = Orchestrator::new(probes, telemetry.clone(), clock)?
        .with_mode(ExecutionMode::Concurrent);

    let report = orchestrator.run().await;
    print!("\n{report}");
    if let Some(summary) = narrate(&report, &SummaryDelegate).await {
        println!("\n{summary}");
    }

    let stats = telemetry.shutdown(Duration::from_secs(2));
    println!(
        "\ntelemetry: {} exported, {} dropped",
        stats.exported, stats.dropped
    );
    Ok(())
}
