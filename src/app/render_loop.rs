use std::path::PathBuf;
use std::time::Instant;

use crossbeam::channel::{select, Receiver};
use embedded_hal::{delay::DelayNs, digital::OutputPin};

use super::Logger;
use crate::{
    dashboard::{compose, Readings},
    lcd_driver::Hd44780,
    telemetry::{Snapshot, TelemetrySource},
    Error, Result,
};

/// What to sample and how to scale it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardSettings {
    pub disk_path: PathBuf,
    pub interface: String,
    pub max_network_bytes_per_sec: u64,
}

/// Refresh the panel now, then once per tick until shutdown is signalled or
/// the tick source closes. Returns how many frames reached the display.
///
/// Renders run on the calling thread and the next tick is only taken after
/// the current render returns, so bus access never overlaps.
pub(super) fn run_render_loop<P, D, S>(
    lcd: &mut Hd44780<P, D>,
    source: &mut S,
    settings: &DashboardSettings,
    logger: &Logger,
    ticks: &Receiver<Instant>,
    shutdown: &Receiver<()>,
    mut after_render: impl FnMut(),
) -> Result<usize>
where
    P: OutputPin,
    D: DelayNs,
    S: TelemetrySource + ?Sized,
{
    let mut previous: Option<Snapshot> = None;
    let mut rendered = 0;

    loop {
        if refresh(lcd, source, settings, logger, &mut previous)? {
            rendered += 1;
            after_render();
        }

        select! {
            recv(shutdown) -> _ => {
                logger.info("shutdown requested");
                break;
            }
            recv(ticks) -> tick => {
                if tick.is_err() {
                    logger.debug("tick source closed");
                    break;
                }
            }
        }
    }

    Ok(rendered)
}

/// Sample, compose and render one frame. Telemetry and frame validation
/// failures are logged and skip the cycle; bus failures propagate.
pub(super) fn refresh<P, D, S>(
    lcd: &mut Hd44780<P, D>,
    source: &mut S,
    settings: &DashboardSettings,
    logger: &Logger,
    previous: &mut Option<Snapshot>,
) -> Result<bool>
where
    P: OutputPin,
    D: DelayNs,
    S: TelemetrySource + ?Sized,
{
    let started = Instant::now();
    let snapshot = match Snapshot::capture(source, &settings.disk_path, &settings.interface) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            logger.warn(format!("telemetry read failed: {err}"));
            return Ok(false);
        }
    };

    let readings = Readings::from_snapshots(
        &snapshot,
        previous.as_ref(),
        settings.max_network_bytes_per_sec,
    );
    logger.debug(readings.summary());
    *previous = Some(snapshot);

    let text = compose(&readings);
    logger.trace(format!("frame {text:?}"));
    match lcd.render(Some(&text)) {
        Ok(_) => {
            logger.trace(format!("rendered in {:?}", started.elapsed()));
            Ok(true)
        }
        Err(Error::Frame(err)) => {
            logger.warn(format!("frame rejected: {err}"));
            Ok(false)
        }
        Err(err) => Err(err),
    }
}
