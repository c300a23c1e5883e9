//! # netwatch net
//!
//! Everything that touches the outside world:
//! - [`facility`]: the `Facility` trait and adapters (ping, netstat, `/proc/net/dev`)
//! - [`otlp`]: OTLP/HTTP JSON encoding of telemetry records
//! - [`collector`]: an emitter that posts telemetry records to an OTLP collector
//! - [`mock`]: stub facilities and emitters for tests and dry runs

use std::io;
use std::time::Duration;

pub mod collector;
pub mod facility;
pub mod otlp;

mod mock;
pub use mock::{CapturingEmitter, FailingEmitter, StaticFacility};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::collector::{CollectorEmitter, DEFAULT_COLLECTOR_ENDPOINT};
    pub use crate::facility::*;
}

/// Result type for facility invocations
pub type Result<T> = core::result::Result<T, FacilityError>;

/// Why an external facility produced no usable output.
#[derive(Debug, thiserror::Error)]
pub enum FacilityError {
    /// The program or file does not exist or could not be started.
    #[error("`{program}` is unavailable: {source}")]
    Unavailable {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("permission denied invoking `{program}`")]
    PermissionDenied { program: String },
    #[error("`{program}` exited with {status}: {detail}")]
    NonZeroExit {
        program: String,
        status: String,
        detail: String,
    },
    #[error("reading `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

impl FacilityError {
    /// Classify an error from spawning `program` or opening a file.
    pub fn from_io(program: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => FacilityError::PermissionDenied {
                program: program.to_string(),
            },
            io::ErrorKind::NotFound => FacilityError::Unavailable {
                program: program.to_string(),
                source: err,
            },
            _ => FacilityError::Read {
                path: program.to_string(),
                source: err,
            },
        }
    }
}
