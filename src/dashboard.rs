//! Telemetry to text: lays out the four dashboard rows.

use crate::lcd_driver::frame::WIDTH;
use crate::telemetry::Snapshot;

/// HD44780 ROM code 0xFF is a solid 5x8 block.
pub const BAR_CHAR: char = '\u{FF}';
const BAR_CELLS: f32 = (WIDTH - 1) as f32;
const NOT_AVAILABLE: &str = "N/A";

/// Empirical link ceiling used to scale the network bar (82 MiB/s).
pub const DEFAULT_MAX_NETWORK_BYTES_PER_SEC: u64 = 82 * 1024 * 1024;

/// Values shown on one refresh, derived from two consecutive snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct Readings {
    pub temperature_c: Option<f32>,
    pub ipv4: Option<std::net::Ipv4Addr>,
    pub cpu_pct: f32,
    pub network_bytes_per_sec: f64,
    pub network_pct: f32,
    pub disk_pct: f32,
}

impl Readings {
    /// `previous` is `None` on the first refresh, which reports no traffic.
    pub fn from_snapshots(
        current: &Snapshot,
        previous: Option<&Snapshot>,
        max_bytes_per_sec: u64,
    ) -> Self {
        let rate = previous.map_or(0.0, |prev| current.network_rate(prev));
        let network_pct = if max_bytes_per_sec == 0 {
            0.0
        } else {
            (100.0 * (rate / max_bytes_per_sec as f64).min(1.0)) as f32
        };
        Self {
            temperature_c: current.cpu_temperature_c,
            ipv4: current.ipv4,
            cpu_pct: current.cpu_usage_pct,
            network_bytes_per_sec: rate,
            network_pct,
            disk_pct: current.disk_usage_pct,
        }
    }

    /// One-line summary for the debug log.
    pub fn summary(&self) -> String {
        let temp = self
            .temperature_c
            .map_or_else(|| NOT_AVAILABLE.to_string(), |t| format!("{t:.1}°C"));
        format!(
            "TEMPERATURE {temp} CPU {:.1}% DISK {:.1}% NETWORK {:.0} B/s",
            self.cpu_pct, self.disk_pct, self.network_bytes_per_sec
        )
    }
}

/// Build the 4-row text frame. Every row fits the panel width.
pub fn compose(readings: &Readings) -> String {
    let temp = readings
        .temperature_c
        .map_or_else(|| format!("{NOT_AVAILABLE:<4}"), |t| format!("{t:3.1}"));
    let ipv4 = readings
        .ipv4
        .map_or_else(|| NOT_AVAILABLE.to_string(), |addr| addr.to_string());

    let rows = [
        format!("{temp}C{ipv4:>15}"),
        bar('C', readings.cpu_pct),
        bar('N', readings.network_pct),
        bar('D', readings.disk_pct),
    ];
    rows.iter()
        .map(|row| row.chars().take(WIDTH).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A label followed by up to 19 block characters.
pub fn bar(label: char, percent: f32) -> String {
    let percent = if percent.is_finite() {
        percent.clamp(0.0, 100.0)
    } else {
        0.0
    };
    let cells = (BAR_CELLS * percent / 100.0).round() as usize;
    std::iter::once(label)
        .chain(std::iter::repeat(BAR_CHAR).take(cells))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lcd_driver::frame::Frame;
    use crate::telemetry::NetworkCounters;
    use std::net::Ipv4Addr;
    use std::time::{Duration, Instant};

    fn snapshot(at: Instant, sent: u64, received: u64) -> Snapshot {
        Snapshot {
            taken_at: at,
            cpu_temperature_c: Some(48.3),
            cpu_usage_pct: 50.0,
            disk_usage_pct: 100.0,
            network: NetworkCounters { sent, received },
            ipv4: Some(Ipv4Addr::new(10, 0, 0, 7)),
        }
    }

    #[test]
    fn bar_scales_to_nineteen_cells() {
        assert_eq!(bar('C', 0.0), "C");
        assert_eq!(bar('C', 100.0).chars().count(), 20);
        assert_eq!(bar('C', 50.0).chars().count(), 1 + 10);
        assert_eq!(bar('C', 250.0).chars().count(), 20);
        assert_eq!(bar('C', -3.0), "C");
        assert_eq!(bar('C', f32::NAN), "C");
    }

    #[test]
    fn first_refresh_reports_no_traffic() {
        let now = Instant::now();
        let readings = Readings::from_snapshots(&snapshot(now, 9_000, 9_000), None, 1_000);
        assert_eq!(readings.network_bytes_per_sec, 0.0);
        assert_eq!(readings.network_pct, 0.0);
    }

    #[test]
    fn network_share_is_capped_at_link_capacity() {
        let start = Instant::now();
        let prev = snapshot(start, 0, 0);
        let half = snapshot(start + Duration::from_secs(2), 500, 500);
        let readings = Readings::from_snapshots(&half, Some(&prev), 1_000);
        assert_eq!(readings.network_bytes_per_sec, 500.0);
        assert_eq!(readings.network_pct, 50.0);

        let flood = snapshot(start + Duration::from_secs(2), 1_000_000, 0);
        let readings = Readings::from_snapshots(&flood, Some(&prev), 1_000);
        assert_eq!(readings.network_pct, 100.0);
    }

    #[test]
    fn composed_frame_always_fits_panel() {
        let now = Instant::now();
        let readings = Readings::from_snapshots(
            &snapshot(now, 0, 0),
            None,
            DEFAULT_MAX_NETWORK_BYTES_PER_SEC,
        );
        let text = compose(&readings);
        let frame = Frame::parse(Some(&text)).unwrap();
        let rows = frame.rows();
        assert_eq!(rows[0], "48.3C       10.0.0.7");
        assert_eq!(rows[1].chars().count(), 11);
        assert_eq!(rows[2], "N");
        assert_eq!(rows[3].chars().count(), 20);
    }

    #[test]
    fn hot_cpu_and_missing_address_still_fit() {
        let readings = Readings {
            temperature_c: Some(123.0),
            ipv4: None,
            cpu_pct: 0.0,
            network_bytes_per_sec: 0.0,
            network_pct: 0.0,
            disk_pct: 0.0,
        };
        let text = compose(&readings);
        let first = text.lines().next().unwrap();
        assert_eq!(first.chars().count(), WIDTH);
        assert!(first.starts_with("123.0C"));

        let no_sensor = Readings {
            temperature_c: None,
            ..readings
        };
        assert!(compose(&no_sensor).starts_with("N/A C"));
    }
}
