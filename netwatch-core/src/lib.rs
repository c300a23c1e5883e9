//! # netwatch core
//!
//! Building blocks shared by every netwatch crate:
//! - [`measure`]: the per-probe measurement
//! - [`observe`]: span/event/metric records, ids, and the sink contract
//! - [`parse`]: extraction rules for ping / netstat / `/proc/net/dev` output
//! - [`delegate`]: the optional reasoning delegate interface
//!
//! ## Feature Flags
//!
//! - `telemetry` (default): `tracing` bridge for telemetry records

#![forbid(unsafe_code)]

pub mod delegate;
pub mod measure;
pub mod observe;
pub mod parse;

#[cfg(feature = "telemetry")]
pub mod telemetry;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::delegate::{DelegateTask, NullDelegate, ReasoningDelegate};
    pub use crate::measure::Measurement;
    pub use crate::observe::{MetricKind, SpanGuard, SpanHandle, SpanStatus, TelemetrySink};
}

pub use delegate::DelegateError;
pub use parse::ParseError;
