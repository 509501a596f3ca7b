use std::path::Path;
use std::time::Duration;

use embedded_hal::delay::DelayNs;

use crate::{lcd_driver::BusPins, Error, Result};

#[cfg(target_os = "linux")]
use crate::lcd_driver::ParallelPins;

/// Present once the kernel's BCM2835 gpiomem driver is bound.
pub const DEFAULT_GPIO_PROBE: &str = "/sys/bus/platform/drivers/gpiomem-bcm2835";

/// Fail fast when the GPIO subsystem is not reachable on this host.
pub fn gpio_available(probe: &Path) -> Result<()> {
    if probe.exists() {
        Ok(())
    } else {
        Err(Error::GpioUnavailable(format!(
            "{} not found; is this a Raspberry Pi with gpiomem enabled?",
            probe.display()
        )))
    }
}

#[cfg(target_os = "linux")]
fn map_gpio_err(err: rppal::gpio::Error) -> Error {
    Error::GpioUnavailable(err.to_string())
}

/// Claim every bus pin as an output driven low.
///
/// Pins left configured by an earlier run are simply reconfigured. rppal
/// restores each pin's previous mode when its handle drops.
#[cfg(target_os = "linux")]
pub fn open(pins: &BusPins) -> Result<ParallelPins<rppal::gpio::OutputPin>> {
    pins.validate()?;
    let gpio = rppal::gpio::Gpio::new().map_err(map_gpio_err)?;
    let claim = |bcm: u8| -> Result<rppal::gpio::OutputPin> {
        let mut pin = gpio.get(bcm).map_err(map_gpio_err)?.into_output_low();
        pin.set_reset_on_drop(true);
        Ok(pin)
    };

    let mut data = Vec::with_capacity(pins.data.len());
    for &bcm in &pins.data {
        data.push(claim(bcm)?);
    }
    let data: [rppal::gpio::OutputPin; 8] = data
        .try_into()
        .map_err(|_| Error::InvalidArgs("expected exactly 8 data pins".into()))?;

    Ok(ParallelPins {
        data,
        mode: claim(pins.mode)?,
        enable: claim(pins.enable)?,
    })
}

/// Non-Linux stub to satisfy builds on dev hosts; returns errors at runtime.
#[cfg(not(target_os = "linux"))]
pub fn open(pins: &BusPins) -> Result<()> {
    pins.validate()?;
    Err(Error::GpioUnavailable(
        "GPIO access is only available on Linux targets".into(),
    ))
}

/// Blocking delay backed by `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDelay;

impl DelayNs for ThreadDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_probe_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = gpio_available(&dir.path().join("gpiomem-bcm2835")).unwrap_err();
        assert!(matches!(err, Error::GpioUnavailable(_)));
        assert!(format!("{err}").contains("gpiomem-bcm2835"));
    }

    #[test]
    fn present_probe_passes() {
        let dir = tempfile::tempdir().unwrap();
        gpio_available(dir.path()).unwrap();
    }

    #[test]
    fn open_rejects_conflicting_pins_before_claiming() {
        let pins = BusPins {
            mode: 4,
            enable: 4,
            ..BusPins::default()
        };
        let err = open(&pins).err().expect("conflicting pins must be rejected");
        assert!(matches!(err, Error::InvalidArgs(_)));
    }

    #[test]
    fn thread_delay_sleeps_at_least_requested() {
        let start = std::time::Instant::now();
        ThreadDelay.delay_us(200);
        assert!(start.elapsed() >= Duration::from_micros(200));
    }
}
