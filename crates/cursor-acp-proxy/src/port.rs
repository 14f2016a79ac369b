//! Port discovery.
//!
//! Discovery is two steps. A [`PortScanner`] enumerates sockets already
//! listening in the candidate range, and [`candidate_ports`] turns that set
//! into an ordered list to bind. Enumeration only saves failed binds: a
//! port can be taken between the scan and the bind, so the bind result is
//! what counts.

use std::{collections::HashSet, ops::Range, path::PathBuf, process::Stdio};

use async_trait::async_trait;

/// First port of the default candidate range.
pub const DEFAULT_PORT: u16 = 32124;

/// Size of the default candidate range.
pub const PORT_RANGE_SIZE: u16 = 256;

/// The default candidate range, `32124..32380`.
#[must_use]
pub const fn default_range() -> Range<u16> {
    DEFAULT_PORT..DEFAULT_PORT + PORT_RANGE_SIZE
}

/// Enumerates ports currently listening in a range.
///
/// Implementations are best effort and return an empty set when the
/// information is unavailable.
#[async_trait]
pub trait PortScanner: Send + Sync {
    /// Ports in `range` that already have a listening socket.
    async fn listening_ports(&self, range: Range<u16>) -> HashSet<u16>;
}

/// Scanner backed by `ss -tlnH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SsPortScanner;

#[async_trait]
impl PortScanner for SsPortScanner {
    async fn listening_ports(&self, range: Range<u16>) -> HashSet<u16> {
        let Some(ss) = which_async("ss").await else {
            tracing::debug!("`ss` not found, assuming no listening ports");
            return HashSet::new();
        };

        let output = match tokio::process::Command::new(&ss)
            .arg("-tlnH")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
        {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                tracing::debug!(
                    status = %output.status,
                    "`ss` failed, assuming no listening ports"
                );
                return HashSet::new();
            }
            Err(e) => {
                tracing::debug!(error = %e, "Failed to run `ss`, assuming no listening ports");
                return HashSet::new();
            }
        };

        let Ok(stdout) = String::from_utf8(output.stdout) else {
            return HashSet::new();
        };
        parse_listening_ports(&stdout, &range)
    }
}

/// Parse `ss -tlnH` output into the set of local ports inside `range`.
///
/// The local address is the fourth column: `127.0.0.1:8080`, `*:22`,
/// `[::]:443` or `127.0.0.53%lo:53`.
#[must_use]
pub fn parse_listening_ports(output: &str, range: &Range<u16>) -> HashSet<u16> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().nth(3))
        .filter_map(|local| local.rsplit(':').next())
        .filter_map(|port| port.parse::<u16>().ok())
        .filter(|port| range.contains(port))
        .collect()
}

/// Ports in `range` not present in `used`, lowest first.
#[must_use]
pub fn candidate_ports(used: &HashSet<u16>, range: Range<u16>) -> Vec<u16> {
    range.filter(|port| !used.contains(port)).collect()
}

async fn which_async(executable: &str) -> Option<PathBuf> {
    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}
