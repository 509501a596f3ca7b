use std::fmt;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use sysinfo::{Components, Disks, Networks, System, MINIMUM_CPU_UPDATE_INTERVAL};

use super::{format_bytes, NetworkCounters, TelemetrySource};
use crate::{Error, Result};

/// Raspberry Pi kernels expose the SoC sensor as `cpu_thermal`.
const CPU_SENSOR_HINT: &str = "cpu";

/// [`TelemetrySource`] backed by `sysinfo`.
pub struct SysinfoSource {
    system: System,
    cpu_refreshed_at: Instant,
}

impl SysinfoSource {
    /// Check that every disk path resolves and every interface is known
    /// before the first sample is taken.
    pub fn new(disks: &[PathBuf], interfaces: &[String]) -> Result<Self> {
        for path in disks {
            if let Err(err) = fs::canonicalize(path) {
                let mounts: Vec<String> = Disks::new_with_refreshed_list()
                    .list()
                    .iter()
                    .map(|disk| disk.mount_point().display().to_string())
                    .collect();
                return Err(Error::InvalidArgs(format!(
                    "invalid disk path '{}': {err} (expected one of {mounts:?})",
                    path.display()
                )));
            }
        }

        let networks = Networks::new_with_refreshed_list();
        for name in interfaces {
            if !networks.list().contains_key(name) {
                let mut known: Vec<&String> = networks.list().keys().collect();
                known.sort();
                return Err(Error::InvalidArgs(format!(
                    "invalid network interface '{name}' (expected one of {known:?})"
                )));
            }
        }

        let mut system = System::new();
        // Usage is measured between refreshes, so prime the first one.
        system.refresh_cpu_usage();
        Ok(Self {
            system,
            cpu_refreshed_at: Instant::now(),
        })
    }

    pub fn uptime(&self) -> Duration {
        Duration::from_secs(System::uptime())
    }

    /// Mean clock across cores, in GHz.
    pub fn cpu_frequency(&mut self) -> f32 {
        self.system.refresh_cpu_frequency();
        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return 0.0;
        }
        let total_mhz: u64 = cpus.iter().map(|cpu| cpu.frequency()).sum();
        total_mhz as f32 / cpus.len() as f32 / 1000.0
    }

    pub fn ram(&mut self) -> RamReport {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        let used = self.system.used_memory();
        RamReport {
            total,
            available: self.system.available_memory(),
            used,
            usage_pct: percent(used, total),
        }
    }

    /// Space on the filesystem holding `path`. Relative and symlinked paths
    /// are resolved first.
    pub fn disk(&self, path: &Path) -> Result<DiskReport> {
        let resolved = fs::canonicalize(path).map_err(|err| {
            Error::Telemetry(format!("cannot resolve {}: {err}", path.display()))
        })?;
        let space = filesystem_space(&resolved)?;
        Ok(DiskReport {
            path: path.to_path_buf(),
            total: space.total,
            free: space.free,
            used: space.used,
            usage_pct: percent(space.used, space.total),
        })
    }

    pub fn network(&self, interface: &str) -> Result<NetworkReport> {
        let networks = Networks::new_with_refreshed_list();
        let data = networks.list().get(interface).ok_or_else(|| {
            Error::Telemetry(format!("network interface '{interface}' disappeared"))
        })?;
        let ipv4 = data.ip_networks().iter().find_map(|net| match net.addr {
            IpAddr::V4(addr) => Some(addr),
            IpAddr::V6(_) => None,
        });
        let ipv6 = data.ip_networks().iter().find_map(|net| match net.addr {
            IpAddr::V6(addr) => Some(addr),
            IpAddr::V4(_) => None,
        });
        Ok(NetworkReport {
            name: interface.to_string(),
            ipv4,
            ipv6,
            mac: data.mac_address().to_string().to_uppercase(),
            counters: NetworkCounters {
                sent: data.total_transmitted(),
                received: data.total_received(),
            },
        })
    }

    /// Everything `hostlcd report` prints.
    pub fn report(&mut self, disks: &[PathBuf], interfaces: &[String]) -> Result<SystemReport> {
        self.settle_cpu();
        let cpu = CpuReport {
            temperature_c: self.cpu_temperature(),
            frequency_ghz: self.cpu_frequency(),
            usage_pct: self.cpu_usage(),
        };
        let ram = self.ram();
        let disks = disks
            .iter()
            .map(|path| self.disk(path))
            .collect::<Result<Vec<_>>>()?;
        let networks = interfaces
            .iter()
            .map(|name| self.network(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(SystemReport {
            uptime_secs: self.uptime().as_secs(),
            cpu,
            ram,
            disks,
            networks,
        })
    }
}

impl SysinfoSource {
    /// sysinfo needs `MINIMUM_CPU_UPDATE_INTERVAL` between refreshes for a
    /// usage figure to mean anything.
    fn settle_cpu(&self) {
        let since = self.cpu_refreshed_at.elapsed();
        if since < MINIMUM_CPU_UPDATE_INTERVAL {
            std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL - since);
        }
    }
}

impl TelemetrySource for SysinfoSource {
    fn cpu_temperature(&mut self) -> Option<f32> {
        let components = Components::new_with_refreshed_list();
        let readings: Vec<(&str, f32)> = components
            .list()
            .iter()
            .filter_map(|c| c.temperature().map(|t| (c.label(), t)))
            .collect();
        readings
            .iter()
            .find(|(label, _)| label.to_ascii_lowercase().contains(CPU_SENSOR_HINT))
            .or_else(|| readings.first())
            .map(|(_, temp)| *temp)
    }

    fn cpu_usage(&mut self) -> f32 {
        self.system.refresh_cpu_usage();
        self.cpu_refreshed_at = Instant::now();
        self.system.global_cpu_usage().clamp(0.0, 100.0)
    }

    fn disk_usage(&mut self, path: &Path) -> Result<f32> {
        Ok(self.disk(path)?.usage_pct)
    }

    fn network_counters(&mut self, interface: &str) -> Result<NetworkCounters> {
        Ok(self.network(interface)?.counters)
    }

    fn ipv4(&mut self, interface: &str) -> Option<Ipv4Addr> {
        self.network(interface).ok().and_then(|net| net.ipv4)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Space {
    total: u64,
    free: u64,
    used: u64,
}

impl Space {
    /// Blocks reserved for root count as neither used nor free, the same
    /// split `df` reports.
    #[cfg_attr(not(unix), allow(dead_code))]
    fn from_blocks(blocks: u64, blocks_free: u64, blocks_avail: u64, fragment: u64) -> Self {
        Self {
            total: blocks.saturating_mul(fragment),
            free: blocks_avail.saturating_mul(fragment),
            used: blocks.saturating_sub(blocks_free).saturating_mul(fragment),
        }
    }
}

#[cfg(unix)]
fn filesystem_space(path: &Path) -> Result<Space> {
    let stat = rustix::fs::statvfs(path).map_err(|errno| {
        Error::Telemetry(format!(
            "statvfs {} failed: {}",
            path.display(),
            std::io::Error::from(errno)
        ))
    })?;
    Ok(Space::from_blocks(
        stat.f_blocks,
        stat.f_bfree,
        stat.f_bavail,
        stat.f_frsize,
    ))
}

/// Without statvfs the mount with the longest matching prefix is used, and
/// reserved space cannot be told apart from used space.
#[cfg(not(unix))]
fn filesystem_space(path: &Path) -> Result<Space> {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .ok_or_else(|| {
            Error::Telemetry(format!("no mounted filesystem holds {}", path.display()))
        })?;
    let total = disk.total_space();
    let free = disk.available_space();
    Ok(Space {
        total,
        free,
        used: total.saturating_sub(free),
    })
}

fn percent(part: u64, whole: u64) -> f32 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 * 100.0 / whole as f64) as f32
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CpuReport {
    pub temperature_c: Option<f32>,
    pub frequency_ghz: f32,
    pub usage_pct: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RamReport {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub usage_pct: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskReport {
    pub path: PathBuf,
    pub total: u64,
    pub free: u64,
    pub used: u64,
    pub usage_pct: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkReport {
    pub name: String,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub mac: String,
    pub counters: NetworkCounters,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemReport {
    pub uptime_secs: u64,
    pub cpu: CpuReport,
    pub ram: RamReport,
    pub disks: Vec<DiskReport>,
    pub networks: Vec<NetworkReport>,
}

fn or_na<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

impl fmt::Display for SystemReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "uptime {}",
            humantime::format_duration(Duration::from_secs(self.uptime_secs))
        )?;
        writeln!(
            f,
            "CPU  temperature {}, frequency {:.2} GHz, usage {:.1}%",
            self.cpu
                .temperature_c
                .map_or_else(|| "N/A".to_string(), |t| format!("{t:.1}°C")),
            self.cpu.frequency_ghz,
            self.cpu.usage_pct
        )?;
        writeln!(
            f,
            "RAM  total {}, free {}, used {}, usage {:.1}%",
            format_bytes(self.ram.total),
            format_bytes(self.ram.available),
            format_bytes(self.ram.used),
            self.ram.usage_pct
        )?;
        for disk in &self.disks {
            writeln!(
                f,
                "DISK '{}' total {}, free {}, used {}, usage {:.2}%",
                disk.path.display(),
                format_bytes(disk.total),
                format_bytes(disk.free),
                format_bytes(disk.used),
                disk.usage_pct
            )?;
        }
        for net in &self.networks {
            writeln!(
                f,
                "NET  {} IPv4 {}, IPv6 {}, MAC {}, sent {}, received {}",
                net.name,
                or_na(net.ipv4),
                or_na(net.ipv6),
                net.mac,
                format_bytes(net.counters.sent),
                format_bytes(net.counters.received)
            )?;
        }
        Ok(())
    }
}
