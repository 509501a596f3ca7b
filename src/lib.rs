pub mod app;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod lcd_driver;
pub mod telemetry;

use lcd_driver::frame::FrameError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    InvalidArgs(String),
    Io(std::io::Error),
    Frame(FrameError),
    GpioUnavailable(String),
    Telemetry(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidArgs(msg) => write!(f, "invalid arguments: {msg}"),
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Frame(err) => write!(f, "invalid frame: {err}"),
            Error::GpioUnavailable(msg) => write!(f, "gpio unavailable: {msg}"),
            Error::Telemetry(msg) => write!(f, "telemetry error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Frame(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<FrameError> for Error {
    fn from(value: FrameError) -> Self {
        Error::Frame(value)
    }
}
