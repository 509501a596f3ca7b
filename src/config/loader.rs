use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{Error, Result};

use super::{Config, CONFIG_DIR_NAME, CONFIG_FILE_NAME};

pub fn load_or_default() -> Result<Config> {
    let path = config_path()?;
    if !path.exists() {
        let cfg = Config::default();
        cfg.save_to_path(&path)?;
        super::validate(&cfg)?;
        return Ok(cfg);
    }
    load_from_path(&path)
}

pub fn load_from_path(path: &Path) -> Result<Config> {
    if !path.exists() {
        let cfg = Config::default();
        super::validate(&cfg)?;
        return Ok(cfg);
    }

    let raw = fs::read_to_string(path)?;
    parse(&raw)
}

pub fn save_to_path(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let contents = format!(
        "# hostlcd config\n\
interval_secs = {}\n\
disk_path = \"{}\"\n\
interface = \"{}\"\n\
max_network_bytes_per_sec = {}\n\
data_pins = {}\n\
mode_pin = {}\n\
enable_pin = {}\n\
gpio_probe_path = \"{}\"\n\
log_level = \"{}\"\n\
log_file = {}\n",
        config.interval_secs,
        config.disk_path.display(),
        config.interface,
        config.max_network_bytes_per_sec,
        super::format_pin_array(&config.pins.data),
        config.pins.mode,
        config.pins.enable,
        config.gpio_probe_path.display(),
        config.log_level,
        config
            .log_file
            .as_ref()
            .map(|p| format!("\"{p}\""))
            .unwrap_or_else(|| "null".into()),
    );
    fs::write(path, contents)?;
    Ok(())
}

pub fn parse(raw: &str) -> Result<Config> {
    let mut cfg = Config::default();

    for (idx, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let (key, value) = trimmed.split_once('=').ok_or_else(|| {
            Error::InvalidArgs(format!("invalid config line {}: '{}'", idx + 1, line))
        })?;

        let key = key.trim();
        let value = value.trim().trim_matches('"');
        match key {
            "interval_secs" => {
                cfg.interval_secs = value.parse().map_err(|_| {
                    Error::InvalidArgs(format!("invalid interval_secs on line {}", idx + 1))
                })?;
            }
            "disk_path" => cfg.disk_path = PathBuf::from(value),
            "interface" => cfg.interface = value.to_string(),
            "max_network_bytes_per_sec" => {
                cfg.max_network_bytes_per_sec = value.parse().map_err(|_| {
                    Error::InvalidArgs(format!(
                        "invalid max_network_bytes_per_sec on line {}",
                        idx + 1
                    ))
                })?;
            }
            "data_pins" => {
                cfg.pins.data = super::parse_pin_array(value).map_err(|e| {
                    Error::InvalidArgs(format!("invalid data_pins on line {}: {e}", idx + 1))
                })?;
            }
            "mode_pin" => {
                cfg.pins.mode = value.parse().map_err(|_| {
                    Error::InvalidArgs(format!("invalid mode_pin on line {}", idx + 1))
                })?;
            }
            "enable_pin" => {
                cfg.pins.enable = value.parse().map_err(|_| {
                    Error::InvalidArgs(format!("invalid enable_pin on line {}", idx + 1))
                })?;
            }
            "gpio_probe_path" => cfg.gpio_probe_path = PathBuf::from(value),
            "log_level" => {
                cfg.log_level = value.parse().map_err(|_| {
                    Error::InvalidArgs(format!(
                        "invalid log_level on line {} (expected error, warn, info, debug or trace)",
                        idx + 1
                    ))
                })?;
            }
            "log_file" => {
                cfg.log_file = if value == "null" || value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            other => {
                return Err(Error::InvalidArgs(format!(
                    "unknown config key '{}' on line {}",
                    other,
                    idx + 1
                )));
            }
        }
    }

    super::validate(&cfg)?;
    Ok(cfg)
}

fn config_path() -> Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| Error::InvalidArgs("HOME not set; cannot locate config directory".into()))?;
    Ok(home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
