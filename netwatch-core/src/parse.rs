//! Extraction rules for facility output.
//!
//! Each rule is a pure function over the raw text a facility produced. They
//! never panic on arbitrary input; anything unrecognised is a [`ParseError`].

/// Why a facility's output could not be turned into a number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("facility produced no output")]
    EmptyOutput,
    #[error("no line matching `{pattern}` in facility output")]
    PatternNotFound { pattern: &'static str },
    #[error("malformed number `{token}`")]
    MalformedNumber { token: String },
    #[error("facility output is not {expected}")]
    UnexpectedOutput { expected: &'static str },
}

/// Packet totals reported by the OS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PacketCounters {
    pub sent: u64,
    pub received: u64,
}

impl PacketCounters {
    pub fn new(sent: u64, received: u64) -> Self {
        Self { sent, received }
    }

    pub fn total(&self) -> u64 {
        self.sent.saturating_add(self.received)
    }
}

/// Round-trip time of the first echo reply, in milliseconds.
///
/// Matches `time=23.4 ms` (Unix), `time=14ms` and `time<1ms` (Windows).
pub fn parse_ping_latency(output: &str) -> Result<f64, ParseError> {
    if output.trim().is_empty() {
        return Err(ParseError::EmptyOutput);
    }
    let token = output
        .lines()
        .find_map(|line| {
            line.find("time=")
                .or_else(|| line.find("time<"))
                .map(|idx| &line[idx + 5..])
        })
        .ok_or(ParseError::PatternNotFound { pattern: "time=" })?;

    let number: &str = token
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .next()
        .unwrap_or_default();
    parse_number(number, token)
}

/// Sent and received totals from `netstat -s`.
///
/// Received: the first "total packets received" line, else the first line
/// mentioning "packets received". Sent: "requests sent out" (Linux),
/// "packets sent from this host" (BSD/macOS) or "packets sent". Windows
/// prints `Packets Received = N`; the value after `=` is used there. A
/// missing sent line counts as zero.
pub fn parse_netstat_packets(output: &str) -> Result<PacketCounters, ParseError> {
    if output.trim().is_empty() {
        return Err(ParseError::EmptyOutput);
    }
    let received = first_count(output, &["total packets received", "packets received"])?.ok_or(
        ParseError::PatternNotFound {
            pattern: "packets received",
        },
    )?;
    let sent = first_count(
        output,
        &["requests sent out", "packets sent from this host", "packets sent"],
    )?
    .unwrap_or(0);
    Ok(PacketCounters { sent, received })
}

/// Packet totals from the Linux `/proc/net/dev` table, summed over
/// interfaces. Columns after `iface:` are eight receive counters then eight
/// transmit counters; packets are columns 1 and 9.
pub fn parse_proc_net_dev(
    table: &str,
    include_loopback: bool,
) -> Result<PacketCounters, ParseError> {
    if table.trim().is_empty() {
        return Err(ParseError::EmptyOutput);
    }
    let mut counters = PacketCounters::default();
    let mut interfaces = 0usize;
    for line in table.lines() {
        let Some((iface, stats)) = line.split_once(':') else {
            continue;
        };
        let iface = iface.trim();
        if iface.is_empty() || iface.contains('|') {
            continue;
        }
        if !include_loopback && iface == "lo" {
            continue;
        }
        let fields: Vec<&str> = stats.split_whitespace().collect();
        if fields.len() < 10 {
            return Err(ParseError::MalformedNumber {
                token: line.trim().to_string(),
            });
        }
        let rx = parse_count(fields[1])?;
        let tx = parse_count(fields[9])?;
        counters.received = counters.received.saturating_add(rx);
        counters.sent = counters.sent.saturating_add(tx);
        interfaces += 1;
    }
    if interfaces == 0 {
        return Err(ParseError::PatternNotFound { pattern: "iface:" });
    }
    Ok(counters)
}

fn first_count(output: &str, needles: &[&str]) -> Result<Option<u64>, ParseError> {
    for needle in needles {
        let hit = output
            .lines()
            .find(|line| line.to_ascii_lowercase().contains(needle));
        if let Some(line) = hit {
            let line = line.trim();
            let token = match line.split_once('=') {
                Some((_, rhs)) => rhs.trim(),
                None => line.split_whitespace().next().unwrap_or_default(),
            };
            return parse_count(token).map(Some);
        }
    }
    Ok(None)
}

fn parse_count(token: &str) -> Result<u64, ParseError> {
    token.parse::<u64>().map_err(|_| ParseError::MalformedNumber {
        token: token.to_string(),
    })
}

fn parse_number(number: &str, context: &str) -> Result<f64, ParseError> {
    match number.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ParseError::MalformedNumber {
            token: context.split_whitespace().next().unwrap_or_default().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINUX_PING: &str = "\
PING example.com (93.184.216.34) 56(84) bytes of data.
64 bytes from 93.184.216.34: icmp_seq=1 ttl=56 time=23.4 ms
64 bytes from 93.184.216.34: icmp_seq=2 ttl=56 time=25.1 ms

--- example.com ping statistics ---
2 packets transmitted, 2 received, 0% packet loss, time 1001ms
rtt min/avg/max/mdev = 23.4/24.2/25.1/0.8 ms
";

    #[test]
    fn ping_takes_first_reply() {
        assert_eq!(parse_ping_latency(LINUX_PING).unwrap(), 23.4);
    }

    #[test]
    fn ping_windows_formats() {
        let out = "Reply from 8.8.8.8: bytes=32 time=14ms TTL=117\n";
        assert_eq!(parse_ping_latency(out).unwrap(), 14.0);
        let out = "Reply from 127.0.0.1: bytes=32 time<1ms TTL=128\n";
        assert_eq!(parse_ping_latency(out).unwrap(), 1.0);
    }

    #[test]
    fn ping_failures() {
        assert_eq!(parse_ping_latency("").unwrap_err(), ParseError::EmptyOutput);
        assert_eq!(
            parse_ping_latency("ping: unknown host nowhere.invalid\n").unwrap_err(),
            ParseError::PatternNotFound { pattern: "time=" }
        );
        assert!(matches!(
            parse_ping_latency("64 bytes: time=abc ms").unwrap_err(),
            ParseError::MalformedNumber { .. }
        ));
    }

    const LINUX_NETSTAT: &str = "\
Ip:
    Forwarding: 1
    250 total packets received
    0 forwarded
    100 requests sent out
Tcp:
    40 active connection openings
";

    #[test]
    fn netstat_linux_sums_ip_section() {
        let c = parse_netstat_packets(LINUX_NETSTAT).unwrap();
        assert_eq!(c, PacketCounters::new(100, 250));
        assert_eq!(c.total(), 350);
    }

    #[test]
    fn netstat_windows_equals_form() {
        let out = "\
IPv4 Statistics

  Packets Received                   = 5000
  Received Header Errors             = 0
";
        let c = parse_netstat_packets(out).unwrap();
        assert_eq!(c.received, 5000);
        assert_eq!(c.sent, 0);
    }

    #[test]
    fn netstat_without_received_line_fails() {
        assert_eq!(
            parse_netstat_packets("Tcp:\n    3 active connection openings\n").unwrap_err(),
            ParseError::PatternNotFound {
                pattern: "packets received"
            }
        );
    }

    const PROC_NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:    1000      10    0    0    0     0          0         0     1000      10    0    0    0     0       0          0
  eth0:  900000     200    0    0    0     0          0         0   120000      80    0    0    0     0       0          0
 wlan0:   50000      50    0    0    0     0          0         0    20000      20    0    0    0     0       0          0
";

    #[test]
    fn proc_net_dev_skips_loopback_by_default() {
        let c = parse_proc_net_dev(PROC_NET_DEV, false).unwrap();
        assert_eq!(c, PacketCounters::new(100, 250));
    }

    #[test]
    fn proc_net_dev_can_include_loopback() {
        let c = parse_proc_net_dev(PROC_NET_DEV, true).unwrap();
        assert_eq!(c.total(), 370);
    }

    #[test]
    fn proc_net_dev_rejects_truncated_rows() {
        let table = "eth0: 1 2 3\n";
        assert!(matches!(
            parse_proc_net_dev(table, false).unwrap_err(),
            ParseError::MalformedNumber { .. }
        ));
        assert_eq!(
            parse_proc_net_dev("Inter-| Receive\n", false).unwrap_err(),
            ParseError::PatternNotFound { pattern: "iface:" }
        );
    }
}
