//! External facility adapters.
//!
//! A facility is the thing a probe asks for raw data: a process such as
//! `ping` or `netstat`, or a kernel counters table. Adapters only fetch;
//! turning the output into a number is the probe's extraction rule.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use netwatch_core::parse::PacketCounters;
use tokio::process::Command;

use crate::{FacilityError, Result};

/// Raw facility output.
#[derive(Debug, Clone, PartialEq)]
pub enum FacilityOutput {
    /// Combined stdout/stderr of a command, or the contents of a file.
    Text(String),
    /// Counters obtained from a structured source.
    Counters(PacketCounters),
}

/// Something a probe can invoke to obtain raw data.
#[async_trait]
pub trait Facility: Send + Sync {
    /// Human-readable description, e.g. `ping -c 4 example.com`.
    fn describe(&self) -> String;

    async fn invoke(&self) -> Result<FacilityOutput>;
}

/// Platform default flag for the ping sample count.
pub fn default_ping_count_flag() -> &'static str {
    if cfg!(windows) {
        "-n"
    } else {
        "-c"
    }
}

/// Runs a program and captures its combined output.
#[derive(Debug, Clone)]
pub struct CommandFacility {
    program: String,
    args: Vec<String>,
}

impl CommandFacility {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `ping <count_flag> <samples> <target>`
    pub fn ping(target: &str, samples: u32, count_flag: &str) -> Self {
        Self::new(
            "ping",
            [count_flag.to_string(), samples.to_string(), target.to_string()],
        )
    }

    /// `netstat -s`
    pub fn netstat() -> Self {
        Self::new("netstat", ["-s"])
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl Facility for CommandFacility {
    fn describe(&self) -> String {
        let mut s = self.program.clone();
        for arg in &self.args {
            s.push(' ');
            s.push_str(arg);
        }
        s
    }

    async fn invoke(&self) -> Result<FacilityOutput> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FacilityError::from_io(&self.program, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let detail = if stderr.trim().is_empty() {
                stdout.lines().last().unwrap_or_default().trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(FacilityError::NonZeroExit {
                program: self.program.clone(),
                status: output.status.to_string(),
                detail,
            });
        }

        let mut text = stdout.into_owned();
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        Ok(FacilityOutput::Text(text))
    }
}

/// Reads the Linux `/proc/net/dev` counters table.
#[derive(Debug, Clone)]
pub struct ProcNetDevFacility {
    path: PathBuf,
}

impl ProcNetDevFacility {
    pub const DEFAULT_PATH: &'static str = "/proc/net/dev";

    pub fn new() -> Self {
        Self::at(Self::DEFAULT_PATH)
    }

    /// Read the table from another location (containers, tests).
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcNetDevFacility {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Facility for ProcNetDevFacility {
    fn describe(&self) -> String {
        format!("read {}", self.path.display())
    }

    async fn invoke(&self) -> Result<FacilityOutput> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| FacilityError::from_io(&self.path.display().to_string(), e))?;
        Ok(FacilityOutput::Text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_command_layout() {
        let f = CommandFacility::ping("example.com", 4, "-c");
        assert_eq!(f.program(), "ping");
        assert_eq!(f.describe(), "ping -c 4 example.com");
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let f = CommandFacility::new("netwatch-definitely-not-a-real-binary", ["-x"]);
        let err = f.invoke().await.unwrap_err();
        assert!(matches!(err, FacilityError::Unavailable { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn missing_counters_file_is_unavailable() {
        let f = ProcNetDevFacility::at("/nonexistent/netwatch/net/dev");
        let err = f.invoke().await.unwrap_err();
        assert!(matches!(err, FacilityError::Unavailable { .. }), "{err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let f = CommandFacility::new("sh", ["-c", "echo out; echo err >&2"]);
        let FacilityOutput::Text(text) = f.invoke().await.unwrap() else {
            panic!("expected text output");
        };
        assert_eq!(text, "out\nerr\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        let f = CommandFacility::new("sh", ["-c", "echo boom >&2; exit 3"]);
        match f.invoke().await.unwrap_err() {
            FacilityError::NonZeroExit { detail, .. } => assert_eq!(detail, "boom"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
