//! Host readings consumed by the dashboard.
//!
//! The display loop only needs a handful of scalars; [`TelemetrySource`] is
//! the seam between it and whatever reads the OS counters.

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::Result;

pub mod fake;
mod sysinfo_source;

pub use sysinfo_source::{DiskReport, NetworkReport, SysinfoSource, SystemReport};

/// Cumulative byte counters of one network interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetworkCounters {
    pub sent: u64,
    pub received: u64,
}

impl NetworkCounters {
    /// Bytes moved since `previous`. A counter that went backwards (interface
    /// reset) counts as zero rather than wrapping.
    pub fn since(&self, previous: &NetworkCounters) -> NetworkCounters {
        NetworkCounters {
            sent: self.sent.saturating_sub(previous.sent),
            received: self.received.saturating_sub(previous.received),
        }
    }

    pub fn total(&self) -> u64 {
        self.sent.saturating_add(self.received)
    }
}

pub trait TelemetrySource {
    /// CPU temperature in °C, `None` when no sensor is exposed.
    fn cpu_temperature(&mut self) -> Option<f32>;
    /// CPU utilisation across all cores since the previous call, in percent.
    fn cpu_usage(&mut self) -> f32;
    /// Used share of the filesystem holding `path`, in percent.
    fn disk_usage(&mut self, path: &Path) -> Result<f32>;
    fn network_counters(&mut self, interface: &str) -> Result<NetworkCounters>;
    fn ipv4(&mut self, interface: &str) -> Option<Ipv4Addr>;
}

/// One sample of everything the dashboard shows.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub taken_at: Instant,
    pub cpu_temperature_c: Option<f32>,
    pub cpu_usage_pct: f32,
    pub disk_usage_pct: f32,
    pub network: NetworkCounters,
    pub ipv4: Option<Ipv4Addr>,
}

impl Snapshot {
    pub fn capture<S: TelemetrySource + ?Sized>(
        source: &mut S,
        disk: &Path,
        interface: &str,
    ) -> Result<Self> {
        Ok(Self {
            taken_at: Instant::now(),
            cpu_temperature_c: source.cpu_temperature(),
            cpu_usage_pct: source.cpu_usage(),
            disk_usage_pct: source.disk_usage(disk)?,
            network: source.network_counters(interface)?,
            ipv4: source.ipv4(interface),
        })
    }

    /// Combined send+receive rate since `previous`, in bytes per second.
    pub fn network_rate(&self, previous: &Snapshot) -> f64 {
        let elapsed = self
            .taken_at
            .checked_duration_since(previous.taken_at)
            .unwrap_or(Duration::ZERO);
        if elapsed.is_zero() {
            return 0.0;
        }
        self.network.since(&previous.network).total() as f64 / elapsed.as_secs_f64()
    }
}

const UNITS: [&str; 9] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];

/// Render a byte count in the largest binary unit that keeps it below 1024.
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
