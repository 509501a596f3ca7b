use crate::{
    app::LogLevel,
    dashboard::DEFAULT_MAX_NETWORK_BYTES_PER_SEC,
    lcd_driver::{gpio::DEFAULT_GPIO_PROBE, BusPins},
    Error, Result,
};
use std::path::{Path, PathBuf};

pub mod loader;

pub const DEFAULT_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_DISK_PATH: &str = "/";
pub const DEFAULT_INTERFACE: &str = "eth0";
const CONFIG_DIR_NAME: &str = ".hostlcd";
const CONFIG_FILE_NAME: &str = "config.toml";

/// User-supplied settings loaded from the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub interval_secs: u64,
    pub disk_path: PathBuf,
    pub interface: String,
    pub max_network_bytes_per_sec: u64,
    pub pins: BusPins,
    pub gpio_probe_path: PathBuf,
    pub log_level: LogLevel,
    pub log_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            disk_path: PathBuf::from(DEFAULT_DISK_PATH),
            interface: DEFAULT_INTERFACE.to_string(),
            max_network_bytes_per_sec: DEFAULT_MAX_NETWORK_BYTES_PER_SEC,
            pins: BusPins::default(),
            gpio_probe_path: PathBuf::from(DEFAULT_GPIO_PROBE),
            log_level: LogLevel::default(),
            log_file: None,
        }
    }
}

impl Config {
    pub fn load_or_default() -> Result<Self> {
        loader::load_or_default()
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        loader::load_from_path(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        loader::save_to_path(self, path)
    }
}

pub(crate) fn validate(cfg: &Config) -> Result<()> {
    if cfg.interval_secs == 0 {
        return Err(Error::InvalidArgs(
            "interval_secs must be at least 1".into(),
        ));
    }
    if cfg.max_network_bytes_per_sec == 0 {
        return Err(Error::InvalidArgs(
            "max_network_bytes_per_sec must be greater than 0".into(),
        ));
    }
    if cfg.interface.trim().is_empty() {
        return Err(Error::InvalidArgs("interface must not be empty".into()));
    }
    cfg.pins.validate()
}

fn parse_pin_array(raw: &str) -> std::result::Result<[u8; 8], String> {
    let trimmed = raw.trim();
    if !trimmed.starts_with('[') || !trimmed.ends_with(']') {
        return Err("expected array literal (e.g., [15, 18, 23, 24, 25, 8, 7, 1])".into());
    }
    let inner = &trimmed[1..trimmed.len() - 1];
    let pins = inner
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<u8>()
                .map_err(|_| format!("'{item}' is not a pin number"))
        })
        .collect::<std::result::Result<Vec<u8>, String>>()?;
    let count = pins.len();
    pins.try_into()
        .map_err(|_| format!("expected 8 data pins, found {count}"))
}

fn format_pin_array(pins: &[u8; 8]) -> String {
    let joined = pins
        .iter()
        .map(|pin| pin.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{joined}]")
}
