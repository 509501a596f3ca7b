use crate::{app::LogLevel, Error, Result};

/// Options shared by every command; values are `None` when not provided on CLI.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunOptions {
    pub config_file: Option<String>,
    pub interval_secs: Option<u64>,
    pub disk_path: Option<String>,
    pub interface: Option<String>,
    pub log_level: Option<LogLevel>,
    pub log_file: Option<String>,
    pub once: bool,
    pub dry_run: bool,
    pub json: bool,
}

/// Parsed command-line intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(RunOptions),
    TestPattern(RunOptions),
    Report(RunOptions),
    ShowHelp,
    ShowVersion,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut iter = args.iter();
        match iter.next().map(|s| s.as_str()) {
            None => Ok(Command::Run(RunOptions::default())),
            Some("run") => Ok(Command::Run(parse_options(&mut iter)?)),
            Some("test-pattern") => Ok(Command::TestPattern(parse_options(&mut iter)?)),
            Some("report") => Ok(Command::Report(parse_options(&mut iter)?)),
            Some("--help") | Some("-h") => Ok(Command::ShowHelp),
            Some("--version") | Some("-V") => Ok(Command::ShowVersion),
            Some(flag) if flag.starts_with('-') => {
                // `run` may be omitted: re-parse every arg as a run flag.
                let mut iter = args.iter();
                Ok(Command::Run(parse_options(&mut iter)?))
            }
            Some(cmd) => Err(Error::InvalidArgs(format!(
                "unknown command '{cmd}', try --help"
            ))),
        }
    }

    pub fn help() -> &'static str {
        concat!(
            "hostlcd - host telemetry on a 20x4 HD44780 LCD\n",
            "\n",
            "USAGE:\n",
            "  hostlcd [run] [--config <path>] [--interval <secs>] [--disk <path>] [--interface <name>]\n",
            "                [--log-level <level>] [--log-file <path>] [--once] [--dry-run]\n",
            "  hostlcd test-pattern [--dry-run]\n",
            "  hostlcd report [--disk <path>] [--interface <name>] [--json]\n",
            "  hostlcd --help\n",
            "  hostlcd --version\n",
            "\n",
            "OPTIONS:\n",
            "  --config <path>      Config file (default: ~/.hostlcd/config.toml)\n",
            "  --interval <secs>    Seconds between refreshes (default: 2)\n",
            "  --disk <path>        Mount point whose usage is shown (default: /)\n",
            "  --interface <name>   Network interface to watch (default: eth0)\n",
            "  --log-level <level>  error, warn, info, debug or trace (default: info)\n",
            "  --log-file <path>    Also append logs to this file (rotated at 1 MiB)\n",
            "  --once               Render a single frame and exit\n",
            "  --dry-run            Print frames to stdout instead of driving GPIO\n",
            "  --json               Emit the report as JSON\n",
            "  -h, --help           Show this help\n",
            "  -V, --version        Show version\n",
        )
    }

    pub fn print_help() {
        println!("{}", Self::help());
    }
}

fn parse_options(iter: &mut std::slice::Iter<String>) -> Result<RunOptions> {
    let mut opts = RunOptions::default();

    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--config" => {
                opts.config_file = Some(take_value(flag, iter)?);
            }
            "--interval" => {
                let raw = take_value(flag, iter)?;
                opts.interval_secs = Some(raw.parse().map_err(|_| {
                    Error::InvalidArgs("interval must be a positive integer".to_string())
                })?);
            }
            "--disk" => {
                opts.disk_path = Some(take_value(flag, iter)?);
            }
            "--interface" => {
                opts.interface = Some(take_value(flag, iter)?);
            }
            "--log-level" => {
                let raw = take_value(flag, iter)?;
                opts.log_level = Some(raw.parse().map_err(|_| {
                    Error::InvalidArgs(format!(
                        "invalid log level '{raw}' (expected error, warn, info, debug or trace)"
                    ))
                })?);
            }
            "--log-file" => {
                opts.log_file = Some(take_value(flag, iter)?);
            }
            "--once" => opts.once = true,
            "--dry-run" => opts.dry_run = true,
            "--json" => opts.json = true,
            other => {
                return Err(Error::InvalidArgs(format!(
                    "unknown flag '{other}', try --help"
                )));
            }
        }
    }

    Ok(opts)
}

fn take_value(flag: &str, iter: &mut std::slice::Iter<String>) -> Result<String> {
    iter.next()
        .cloned()
        .ok_or_else(|| Error::InvalidArgs(format!("expected a value after {flag}")))
}
