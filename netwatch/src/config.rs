//! Monitor configuration.
//!
//! Every field has a default, so a JSON config file only needs the keys it
//! wants to change.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use netwatch_net::facility::default_ping_count_flag;

/// Configuration errors surfaced before any probe runs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("reading config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Where packet totals come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketSource {
    /// Linux `/proc/net/dev` counters table
    ProcNetDev,
    /// `netstat -s` text
    Netstat,
}

impl Default for PacketSource {
    fn default() -> Self {
        if cfg!(target_os = "linux") {
            PacketSource::ProcNetDev
        } else {
            PacketSource::Netstat
        }
    }
}

impl FromStr for PacketSource {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proc" | "proc_net_dev" => Ok(PacketSource::ProcNetDev),
            "netstat" => Ok(PacketSource::Netstat),
            other => Err(ConfigError::Invalid {
                field: "packet_source",
                reason: format!("unknown source `{other}` (expected proc or netstat)"),
            }),
        }
    }
}

/// How the orchestrator schedules probes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One probe at a time, in configuration order
    #[default]
    Sequential,
    /// All probes at once; results still assembled in configuration order
    Concurrent,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::Concurrent => "concurrent",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a monitor process
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Host the latency probe pings
    pub target: String,
    /// Echo requests per latency measurement
    pub ping_samples: u32,
    /// Sample-count flag passed to ping; platform default when unset
    pub ping_count_flag: Option<String>,
    /// Per-probe deadline
    pub probe_timeout_ms: u64,
    /// Packet counter adapter
    pub packet_source: PacketSource,
    /// Count loopback traffic in `/proc/net/dev` totals
    pub include_loopback: bool,
    /// Probe scheduling
    pub mode: ExecutionMode,
    /// OTLP/HTTP collector base URL; a bare `host:port` means `http://host:port`
    pub collector: Option<String>,
    /// Directory for NDJSON span/metric/event logs
    pub artifact_dir: Option<PathBuf>,
    /// Number of runs the binary performs
    pub rounds: u32,
    /// Pause between runs
    pub interval_ms: u64,
    /// Bound on the telemetry flush at shutdown
    pub flush_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            target: "google.com".to_string(),
            ping_samples: 4,
            ping_count_flag: None,
            probe_timeout_ms: 15_000,
            packet_source: PacketSource::default(),
            include_loopback: false,
            mode: ExecutionMode::Sequential,
            collector: None,
            artifact_dir: None,
            rounds: 1,
            interval_ms: 5_000,
            flush_timeout_ms: 2_000,
        }
    }
}

impl MonitorConfig {
    pub fn builder() -> MonitorConfigBuilder {
        MonitorConfigBuilder::new()
    }

    /// Load from a JSON file and validate.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "target",
                reason: "must not be empty".to_string(),
            });
        }
        if self.target.starts_with('-') {
            return Err(ConfigError::Invalid {
                field: "target",
                reason: "must not start with '-'".to_string(),
            });
        }
        if self.ping_samples == 0 {
            return Err(ConfigError::Invalid {
                field: "ping_samples",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "probe_timeout_ms",
                reason: "must be positive".to_string(),
            });
        }
        if self.rounds == 0 {
            return Err(ConfigError::Invalid {
                field: "rounds",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn ping_count_flag(&self) -> &str {
        self.ping_count_flag
            .as_deref()
            .unwrap_or(default_ping_count_flag())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

/// Builder for MonitorConfig
#[derive(Debug, Default)]
pub struct MonitorConfigBuilder {
    config: MonitorConfig,
}

impl MonitorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.config.target = target.into();
        self
    }

    pub fn ping_samples(mut self, samples: u32) -> Self {
        self.config.ping_samples = samples;
        self
    }

    pub fn ping_count_flag(mut self, flag: impl Into<String>) -> Self {
        self.config.ping_count_flag = Some(flag.into());
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn packet_source(mut self, source: PacketSource) -> Self {
        self.config.packet_source = source;
        self
    }

    pub fn include_loopback(mut self, include: bool) -> Self {
        self.config.include_loopback = include;
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn collector(mut self, endpoint: impl Into<String>) -> Self {
        self.config.collector = Some(endpoint.into());
        self
    }

    pub fn artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.artifact_dir = Some(dir.into());
        self
    }

    pub fn rounds(mut self, rounds: u32) -> Self {
        self.config.rounds = rounds;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn build(self) -> Result<MonitorConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
