//! flowtap configuration. Parses a TOML file (or CLI overrides) into a
//! strongly-typed structure; every field has a spec-mandated default so a
//! bare `flowtap.toml` -- or none at all -- is always valid.

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::Result;

/// Observer configuration, consumed once at core construction time.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The local endpoint being observed (the service under test).
    pub local_host: Ipv4Addr,
    pub local_port: u16,

    /// When true, the Out direction is dropped right after classification:
    /// no reassembly, no decode.
    pub only_in: bool,

    /// Reorder buffer size, in queued packets, past which the reassembler
    /// forces progress across a gap.
    pub gap_skip_threshold: usize,

    /// A flow with no accepted packet for longer than this is evicted.
    #[serde(with = "duration_secs")]
    pub session_idle_timeout: Duration,

    /// Period between eviction sweeps.
    #[serde(with = "duration_secs")]
    pub eviction_interval: Duration,

    /// Maximum number of flows inspected per eviction sweep.
    pub eviction_scan_cap: usize,

    /// Period between stats log lines.
    #[serde(with = "duration_secs")]
    pub stats_log_interval: Duration,

    /// Number of parallel packet-processing workers.
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_host: Ipv4Addr::UNSPECIFIED,
            local_port: 6379,
            only_in: false,
            gap_skip_threshold: 200,
            session_idle_timeout: Duration::from_secs(30 * 60),
            eviction_interval: Duration::from_secs(5 * 60),
            eviction_scan_cap: 500,
            stats_log_interval: Duration::from_secs(300),
            workers: 10,
        }
    }
}

impl Config {
    /// Load from a TOML file on disk, falling back to defaults for any
    /// field the file does not mention.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&data)?)
    }
}

/// Serde helper: (de)serialize a `Duration` as whole seconds, so config
/// files read `session_idle_timeout = 1800` rather than a nested struct.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
