//! # netwatch
//!
//! **Resilient, telemetry-instrumented network measurement runs.**
//!
//! A run invokes a small fixed set of probes (ping latency, packet usage),
//! wraps each invocation in a span, records successful values as metrics,
//! and always hands back a [`Report`] listing every probe, with absent
//! values where a probe failed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use netwatch::prelude::*;
//!
//! # async fn demo() -> Result<(), netwatch::Error> {
//! let config = MonitorConfig::builder().target("example.com").build()?;
//! let clock: Arc<dyn Clock> = Arc::new(SystemClock);
//! let telemetry = Arc::new(build_telemetry(&config, Arc::clone(&clock))?);
//! let orchestrator = Orchestrator::from_config(&config, telemetry.clone(), clock)?;
//!
//! let report = orchestrator.run().await;
//! println!("{report}");
//! telemetry.shutdown(config.flush_timeout());
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! - [`netwatch_core`]: measurement, telemetry records, parsing rules, delegate seam
//! - [`netwatch_net`]: facilities and the collector exporter
//! - [`netwatch_runtime`]: clock and sleep abstraction

#![forbid(unsafe_code)]

pub use netwatch_core as core;
pub use netwatch_net as net;
pub use netwatch_runtime as runtime;

pub mod config;
pub mod orchestrator;
pub mod probe;
pub mod report;
pub mod sink;

pub use config::{ConfigError, ExecutionMode, MonitorConfig, MonitorConfigBuilder, PacketSource};
pub use orchestrator::Orchestrator;
pub use probe::{build_probes, Extractor, MeasurementProbe, Probe, ProbeFailure};
pub use report::{narrate, Report, SummaryDelegate};
pub use sink::{build_telemetry, MemorySink, NdjsonEmitter, Telemetry};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::prelude::*;
    pub use crate::net::prelude::*;
    pub use crate::runtime::{Clock, MonitorRuntime, SystemClock};

    pub use crate::{
        build_telemetry, narrate, ExecutionMode, MonitorConfig, Orchestrator, Probe, Report,
        SummaryDelegate, Telemetry,
    };
}

/// Setup errors. Nothing raised once a run has started ends up here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("probe `{0}` configured more than once")]
    DuplicateProbe(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_convert() {
        let err: Error = MonitorConfig::builder()
            .rounds(0)
            .build()
            .unwrap_err()
            .into();
        assert!(err.to_string().contains("rounds"));
    }
}
