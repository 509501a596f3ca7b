use std::net::Ipv4Addr;
use std::path::Path;

use super::{NetworkCounters, TelemetrySource};
use crate::{Error, Result};

/// Fixed readings for tests. Network counters advance by `step` on every
/// read so consecutive snapshots produce a steady throughput.
#[derive(Debug, Clone)]
pub struct FixedSource {
    pub temperature: Option<f32>,
    pub cpu: f32,
    pub disk: f32,
    pub counters: NetworkCounters,
    pub step: NetworkCounters,
    pub ipv4: Option<Ipv4Addr>,
    pub fail_disk: bool,
}

impl Default for FixedSource {
    fn default() -> Self {
        Self {
            temperature: Some(42.0),
            cpu: 50.0,
            disk: 25.0,
            counters: NetworkCounters::default(),
            step: NetworkCounters::default(),
            ipv4: Some(Ipv4Addr::new(192, 168, 1, 20)),
            fail_disk: false,
        }
    }
}

impl TelemetrySource for FixedSource {
    fn cpu_temperature(&mut self) -> Option<f32> {
        self.temperature
    }

    fn cpu_usage(&mut self) -> f32 {
        self.cpu
    }

    fn disk_usage(&mut self, path: &Path) -> Result<f32> {
        if self.fail_disk {
            return Err(Error::Telemetry(format!("no disk at {}", path.display())));
        }
        Ok(self.disk)
    }

    fn network_counters(&mut self, _interface: &str) -> Result<NetworkCounters> {
        let current = self.counters;
        self.counters.sent += self.step.sent;
        self.counters.received += self.step.received;
        Ok(current)
    }

    fn ipv4(&mut self, _interface: &str) -> Option<Ipv4Addr> {
        self.ipv4
    }
}
