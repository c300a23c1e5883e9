//! # netwatch runtime
//!
//! Clock and sleep abstractions so probes, the sink and the round loop can be
//! driven by Tokio in production and by a manual clock in tests.
//!
//! ## Feature Flags
//!
//! - `tokio` (default): Tokio-backed runtime

use core::future::Future;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock timestamps (unix nanoseconds).
pub trait Clock: Send + Sync + 'static {
    fn now_unix_nanos(&self) -> u64;
}

/// Runtime trait for the monitor's async needs.
pub trait MonitorRuntime: Clock {
    /// Sleep for the specified duration
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

fn system_now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_nanos(&self) -> u64 {
        system_now_nanos()
    }
}

#[cfg(feature = "tokio")]
pub mod tokio_runtime {
    //! Tokio-based runtime implementation

    use super::*;

    /// Tokio runtime wrapper
    #[derive(Debug, Clone, Default)]
    pub struct TokioRuntime;

    impl TokioRuntime {
        pub fn new() -> Self {
            Self
        }
    }

    impl Clock for TokioRuntime {
        fn now_unix_nanos(&self) -> u64 {
            system_now_nanos()
        }
    }

    impl MonitorRuntime for TokioRuntime {
        async fn sleep(&self, duration: Duration) {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Manual clock for deterministic tests.
pub mod mock_runtime {
    use super::*;

    /// A clock that only moves when told to.
    ///
    /// Every read advances the clock by `step`, so consecutive timestamps are
    /// distinct but reproducible. `sleep` advances instead of waiting.
    #[derive(Debug, Default)]
    pub struct ManualClock {
        now_nanos: AtomicU64,
        step_nanos: u64,
    }

    impl ManualClock {
        pub fn new(start_nanos: u64) -> Self {
            Self {
                now_nanos: AtomicU64::new(start_nanos),
                step_nanos: 0,
            }
        }

        /// Advance by `step` after every read.
        pub fn with_step(mut self, step: Duration) -> Self {
            self.step_nanos = step.as_nanos() as u64;
            self
        }

        pub fn advance(&self, duration: Duration) {
            self.now_nanos.fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
        }

        /// Current time without stepping.
        pub fn peek(&self) -> u64 {
            self.now_nanos.load(Ordering::SeqCst)
        }
    }

    impl Clock for ManualClock {
        fn now_unix_nanos(&self) -> u64 {
            self.now_nanos.fetch_add(self.step_nanos, Ordering::SeqCst)
        }
    }

    impl MonitorRuntime for ManualClock {
        async fn sleep(&self, duration: Duration) {
            self.advance(duration);
        }
    }
}

/// Get the default runtime based on features
#[cfg(feature = "tokio")]
pub fn default_runtime() -> tokio_runtime::TokioRuntime {
    tokio_runtime::TokioRuntime::new()
}

#[cfg(test)]
mod tests {
    use super::mock_runtime::ManualClock;
    use super::*;

    #[test]
    fn manual_clock_steps_on_read() {
        let clock = ManualClock::new(1_000).with_step(Duration::from_nanos(10));
        assert_eq!(clock.now_unix_nanos(), 1_000);
        assert_eq!(clock.now_unix_nanos(), 1_010);
        assert_eq!(clock.peek(), 1_020);
    }

    #[tokio::test]
    async fn manual_sleep_advances_without_waiting() {
        let clock = ManualClock::new(0);
        clock.sleep(Duration::from_secs(3600)).await;
        assert_eq!(clock.peek(), 3_600_000_000_000);
    }

    #[test]
    fn system_clock_is_after_epoch() {
        assert!(SystemClock.now_unix_nanos() > 0);
    }
}
