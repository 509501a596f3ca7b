use crate::{
    cli::RunOptions,
    config::Config,
    lcd_driver::{fake::FakeBus, gpio, BusPins, Hd44780, WIDTH},
    telemetry::SysinfoSource,
    Error, Result,
};
use crossbeam::channel::{self, Receiver};
use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

mod lifecycle;
mod logger;
mod render_loop;

use lifecycle::create_shutdown_channel;
pub use logger::{LogLevel, Logger};
pub use render_loop::DashboardSettings;
use render_loop::run_render_loop;

pub const TEST_PATTERN: &str = "This\nis\na\ntest!";

/// Config for the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub interval_secs: u64,
    pub disk_path: PathBuf,
    pub interface: String,
    pub max_network_bytes_per_sec: u64,
    pub pins: BusPins,
    pub gpio_probe_path: PathBuf,
    pub log_level: LogLevel,
    pub log_file: Option<String>,
    pub once: bool,
    pub dry_run: bool,
    pub json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_sources(Config::default(), RunOptions::default())
    }
}

impl AppConfig {
    pub fn from_sources(config: Config, opts: RunOptions) -> Self {
        Self {
            interval_secs: opts.interval_secs.unwrap_or(config.interval_secs),
            disk_path: opts.disk_path.map(PathBuf::from).unwrap_or(config.disk_path),
            interface: opts.interface.unwrap_or(config.interface),
            max_network_bytes_per_sec: config.max_network_bytes_per_sec,
            pins: config.pins,
            gpio_probe_path: config.gpio_probe_path,
            log_level: opts.log_level.unwrap_or(config.log_level),
            log_file: opts.log_file.or(config.log_file),
            once: opts.once,
            dry_run: opts.dry_run,
            json: opts.json,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn dashboard(&self) -> DashboardSettings {
        DashboardSettings {
            disk_path: self.disk_path.clone(),
            interface: self.interface.clone(),
            max_network_bytes_per_sec: self.max_network_bytes_per_sec,
        }
    }
}

pub struct App {
    config: AppConfig,
    logger: Logger,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        if config.interval_secs == 0 {
            return Err(Error::InvalidArgs("interval must be at least 1 second".into()));
        }
        let logger = Logger::new(config.log_level, config.log_file.clone())?;
        Ok(Self { config, logger })
    }

    /// Load the config file named by `--config` (or the default location) and
    /// layer the command-line overrides on top.
    pub fn from_options(opts: RunOptions) -> Result<Self> {
        let cfg_file = match opts.config_file.as_deref() {
            Some(path) => Config::load_from_path(Path::new(path))?,
            None => Config::load_or_default()?,
        };
        let merged = AppConfig::from_sources(cfg_file, opts);
        Self::new(merged)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Entry point for the daemon: sample, compose and paint until ctrl-c.
    pub fn run(&self) -> Result<()> {
        let config = &self.config;
        if !config.dry_run {
            gpio::gpio_available(&config.gpio_probe_path)?;
        }

        let mut source = SysinfoSource::new(
            std::slice::from_ref(&config.disk_path),
            std::slice::from_ref(&config.interface),
        )?;
        self.logger.info(format!(
            "daemon start (interval={}s, disk={}, interface={}, dry_run={}, once={})",
            config.interval_secs,
            config.disk_path.display(),
            config.interface,
            config.dry_run,
            config.once
        ));

        let shutdown = create_shutdown_channel()?;
        let ticks = self.ticks();
        let settings = config.dashboard();

        let outcome = if config.dry_run {
            let bus = FakeBus::new();
            let mut lcd = Hd44780::new(bus.pins(), bus.delay())?;
            bus.clear_events();
            run_render_loop(
                &mut lcd,
                &mut source,
                &settings,
                &self.logger,
                &ticks,
                &shutdown,
                || {
                    println!("{}", screen_text(&bus.screen()));
                    bus.clear_events();
                },
            )
        } else {
            self.run_on_hardware(&mut source, &settings, &ticks, &shutdown)
        };
        let rendered = outcome.inspect_err(|err| {
            self.logger.error(format!("display loop stopped: {err}"));
        })?;

        self.logger
            .info(format!("display released after {rendered} frame(s)"));
        Ok(())
    }

    /// Paint the fixed four-line pattern once and exit.
    pub fn show_test_pattern(&self) -> Result<()> {
        if self.config.dry_run {
            let bus = FakeBus::new();
            let mut lcd = Hd44780::new(bus.pins(), bus.delay())?;
            bus.clear_events();
            lcd.render(Some(TEST_PATTERN))?;
            println!("{}", screen_text(&bus.screen()));
            return Ok(());
        }
        gpio::gpio_available(&self.config.gpio_probe_path)?;
        self.test_pattern_on_hardware()?;
        self.logger.info("test pattern rendered");
        Ok(())
    }

    /// Print a one-shot telemetry summary to stdout.
    pub fn print_report(&self) -> Result<()> {
        let disks = [self.config.disk_path.clone()];
        let interfaces = [self.config.interface.clone()];
        let mut source = SysinfoSource::new(&disks, &interfaces)?;
        let report = source.report(&disks, &interfaces)?;
        if self.config.json {
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| Error::Telemetry(format!("failed to encode report: {e}")))?;
            println!("{json}");
        } else {
            print!("{report}");
        }
        Ok(())
    }

    /// `--once` gets an already-closed tick source so the loop stops after
    /// the first frame.
    fn ticks(&self) -> Receiver<Instant> {
        if self.config.once {
            let (tx, rx) = channel::bounded(0);
            drop(tx);
            rx
        } else {
            channel::tick(self.config.interval())
        }
    }

    #[cfg(target_os = "linux")]
    fn run_on_hardware(
        &self,
        source: &mut SysinfoSource,
        settings: &DashboardSettings,
        ticks: &Receiver<Instant>,
        shutdown: &Receiver<()>,
    ) -> Result<usize> {
        let pins = gpio::open(&self.config.pins)?;
        let mut lcd = Hd44780::new(pins, gpio::ThreadDelay)?;
        self.logger.debug(format!("gpio claimed: {:?}", self.config.pins));
        run_render_loop(
            &mut lcd,
            source,
            settings,
            &self.logger,
            ticks,
            shutdown,
            || {},
        )
    }

    #[cfg(not(target_os = "linux"))]
    fn run_on_hardware(
        &self,
        _source: &mut SysinfoSource,
        _settings: &DashboardSettings,
        _ticks: &Receiver<Instant>,
        _shutdown: &Receiver<()>,
    ) -> Result<usize> {
        gpio::open(&self.config.pins)?;
        Err(Error::GpioUnavailable(
            "GPIO access is only available on Linux targets".into(),
        ))
    }

    #[cfg(target_os = "linux")]
    fn test_pattern_on_hardware(&self) -> Result<()> {
        let pins = gpio::open(&self.config.pins)?;
        let mut lcd = Hd44780::new(pins, gpio::ThreadDelay)?;
        lcd.render(Some(TEST_PATTERN))?;
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn test_pattern_on_hardware(&self) -> Result<()> {
        gpio::open(&self.config.pins)
    }
}

/// Boxed view of the panel for `--dry-run`; the bar glyph prints as a block.
pub fn screen_text(rows: &[String]) -> String {
    let border = format!("+{}+", "-".repeat(WIDTH));
    let mut out = border.clone();
    for row in rows {
        let shown: String = row
            .chars()
            .map(|c| if c == crate::dashboard::BAR_CHAR { '█' } else { c })
            .collect();
        out.push_str(&format!("\n|{shown}|"));
    }
    out.push('\n');
    out.push_str(&border);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config_file() {
        let config = Config {
            interval_secs: 7,
            interface: "wlan0".into(),
            log_file: Some("/var/log/hostlcd.log".into()),
            ..Config::default()
        };
        let opts = RunOptions {
            interval_secs: Some(3),
            disk_path: Some("/mnt".into()),
            log_level: Some(LogLevel::Trace),
            dry_run: true,
            ..RunOptions::default()
        };
        let merged = AppConfig::from_sources(config, opts);
        assert_eq!(merged.interval_secs, 3);
        assert_eq!(merged.disk_path, PathBuf::from("/mnt"));
        assert_eq!(merged.interface, "wlan0");
        assert_eq!(merged.log_level, LogLevel::Trace);
        assert_eq!(merged.log_file.as_deref(), Some("/var/log/hostlcd.log"));
        assert!(merged.dry_run);
        assert!(!merged.once);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let cfg = AppConfig {
            interval_secs: 0,
            ..AppConfig::default()
        };
        assert!(matches!(App::new(cfg), Err(Error::InvalidArgs(_))));
    }

    #[test]
    fn once_closes_the_tick_source() {
        let app = App::new(AppConfig {
            once: true,
            log_level: LogLevel::Error,
            ..AppConfig::default()
        })
        .unwrap();
        assert!(app.ticks().recv().is_err());
    }

    #[test]
    fn test_pattern_dry_run_succeeds() {
        let app = App::new(AppConfig {
            dry_run: true,
            log_level: LogLevel::Error,
            ..AppConfig::default()
        })
        .unwrap();
        app.show_test_pattern().unwrap();
    }

    #[test]
    fn screen_text_draws_blocks_inside_border() {
        let rows = [
            "This".to_string() + &" ".repeat(16),
            format!("C{}", "\u{FF}".repeat(19)),
            " ".repeat(20),
            " ".repeat(20),
        ];
        let text = screen_text(&rows);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], format!("+{}+", "-".repeat(20)));
        assert_eq!(lines[1], "|This                |");
        assert_eq!(lines[2], format!("|C{}|", "█".repeat(19)));
    }
}
