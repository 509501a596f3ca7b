//! HD44780 driver for a 20x4 panel wired in 8-bit parallel mode.
//! Every signal is bit-banged: 8 data lines, the RS (mode) line and the E strobe.

use std::time::Duration;

use embedded_hal::{delay::DelayNs, digital::OutputPin};

use crate::{Error, Result};

pub mod fake;
pub mod frame;
pub mod gpio;

use frame::{encode_row, Frame};
pub use frame::{FrameError, HEIGHT, WIDTH};

/// Which controller register a batch of bytes targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// RS low: the bytes are commands.
    Instruction,
    /// RS high: the bytes are characters.
    Data,
}

/// BCM numbers for the 10 bus roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusPins {
    /// D0..D7, least significant bit first.
    pub data: [u8; 8],
    pub mode: u8,
    pub enable: u8,
}

pub const DEFAULT_DATA_PINS: [u8; 8] = [15, 18, 23, 24, 25, 8, 7, 1];
pub const DEFAULT_MODE_PIN: u8 = 14;
pub const DEFAULT_ENABLE_PIN: u8 = 4;
pub const MAX_BCM_PIN: u8 = 27;

impl Default for BusPins {
    fn default() -> Self {
        Self {
            data: DEFAULT_DATA_PINS,
            mode: DEFAULT_MODE_PIN,
            enable: DEFAULT_ENABLE_PIN,
        }
    }
}

impl BusPins {
    /// Every role must map to its own valid BCM pin.
    pub fn validate(&self) -> Result<()> {
        let roles = self
            .data
            .iter()
            .enumerate()
            .map(|(idx, pin)| (format!("d{idx}"), *pin))
            .chain([("mode".to_string(), self.mode), ("enable".to_string(), self.enable)]);

        let mut seen: Vec<(String, u8)> = Vec::with_capacity(10);
        for (role, pin) in roles {
            if pin > MAX_BCM_PIN {
                return Err(Error::InvalidArgs(format!(
                    "{role} pin {pin} is not a BCM GPIO (expected 0-{MAX_BCM_PIN})"
                )));
            }
            if let Some((other, _)) = seen.iter().find(|(_, used)| *used == pin) {
                return Err(Error::InvalidArgs(format!(
                    "{role} pin {pin} is already assigned to {other}"
                )));
            }
            seen.push((role, pin));
        }
        Ok(())
    }
}

/// The claimed output lines, in bus role order.
pub struct ParallelPins<P> {
    pub data: [P; 8],
    pub mode: P,
    pub enable: P,
}

// Commands (HD44780 datasheet, table 6).
const LCD_CLR: u8 = 0x01;
const LCD_ENTRY_MODE: u8 = 0x04;
const LCD_ENTRY_INC: u8 = 0x02;
const LCD_ON_CTRL: u8 = 0x08;
const LCD_ON_DISPLAY: u8 = 0x04;
const LCD_FUNCTION: u8 = 0x20;
const LCD_FUNCTION_8BIT: u8 = 0x10;
const LCD_FUNCTION_2LINES: u8 = 0x08;
const LCD_FUNCTION_RESET: u8 = LCD_FUNCTION | LCD_FUNCTION_8BIT;

/// Commands sent after the first reset nibble, in order.
const INIT_SEQUENCE: [u8; 5] = [
    LCD_FUNCTION_RESET,
    LCD_FUNCTION_RESET,
    LCD_FUNCTION_RESET | LCD_FUNCTION_2LINES,
    LCD_ON_CTRL | LCD_ON_DISPLAY,
    LCD_ENTRY_MODE | LCD_ENTRY_INC,
];

pub const POWER_ON_DELAY: Duration = Duration::from_millis(50);
pub const FIRST_RESET_DELAY: Duration = Duration::from_millis(5);
pub const CLEAR_DELAY: Duration = Duration::from_millis(1);
pub const EXECUTION_DELAY: Duration = Duration::from_micros(100);
pub const ENABLE_PULSE: Duration = Duration::from_micros(1);

/// HD44780 driver. Owns every bus line until dropped.
pub struct Hd44780<P: OutputPin, D: DelayNs> {
    pins: ParallelPins<P>,
    delay: D,
}

impl<P: OutputPin, D: DelayNs> Hd44780<P, D> {
    /// Wait out the power-on window, then reset and clear the controller.
    pub fn new(pins: ParallelPins<P>, delay: D) -> Result<Self> {
        let mut driver = Self { pins, delay };
        driver.wait(POWER_ON_DELAY);
        driver.reset()?;
        Ok(driver)
    }

    /// Force 8-bit mode, then configure 2 lines, display on, auto increment.
    pub fn reset(&mut self) -> Result<&mut Self> {
        self.pins.enable.set_low().map_err(pin_error)?;
        self.send(Register::Instruction, &[LCD_FUNCTION_RESET])?;
        // First command after power-on needs far longer than the usual 37 µs.
        self.wait(FIRST_RESET_DELAY);
        self.send(Register::Instruction, &INIT_SEQUENCE)?;
        self.clear()
    }

    pub fn clear(&mut self) -> Result<&mut Self> {
        self.send(Register::Instruction, &[LCD_CLR])?;
        self.wait(CLEAR_DELAY);
        Ok(self)
    }

    /// Show up to 4 lines of up to 20 characters. `None` is rejected.
    ///
    /// Validation happens before the bus is touched, so a rejected frame
    /// leaves the screen as it was. Rows are always written at full width.
    pub fn render(&mut self, text: Option<&str>) -> Result<&mut Self> {
        let frame = Frame::parse(text)?;
        self.render_frame(&frame)
    }

    pub fn render_frame(&mut self, frame: &Frame) -> Result<&mut Self> {
        self.clear()?;
        for row in frame.physical_rows() {
            self.send(Register::Data, &encode_row(row))?;
        }
        Ok(self)
    }

    /// Clock `bytes` onto the bus. RS is set once for the whole batch.
    pub fn send(&mut self, register: Register, bytes: &[u8]) -> Result<()> {
        set_level(&mut self.pins.mode, register == Register::Data)?;
        for &byte in bytes {
            for (bit, line) in self.pins.data.iter_mut().enumerate() {
                set_level(line, (byte >> bit) & 1 == 1)?;
            }

            self.pins.enable.set_low().map_err(pin_error)?;
            self.wait(ENABLE_PULSE);
            self.pins.enable.set_high().map_err(pin_error)?;
            self.wait(ENABLE_PULSE);
            self.pins.enable.set_low().map_err(pin_error)?;

            self.wait(EXECUTION_DELAY);
        }
        Ok(())
    }

    fn wait(&mut self, duration: Duration) {
        let nanos = u32::try_from(duration.as_nanos()).unwrap_or(u32::MAX);
        self.delay.delay_ns(nanos);
    }
}

impl<P: OutputPin, D: DelayNs> Drop for Hd44780<P, D> {
    fn drop(&mut self) {
        for line in self.pins.data.iter_mut() {
            let _ = line.set_low();
        }
        let _ = self.pins.mode.set_low();
        let _ = self.pins.enable.set_low();
    }
}

fn set_level<P: OutputPin>(pin: &mut P, high: bool) -> Result<()> {
    if high {
        pin.set_high().map_err(pin_error)
    } else {
        pin.set_low().map_err(pin_error)
    }
}

fn pin_error<E: core::fmt::Debug>(err: E) -> Error {
    Error::Io(std::io::Error::other(format!("gpio write failed: {err:?}")))
}

#[cfg(test)]
mod tests {
    use super::fake::{BusEvent, FakeBus, Line, Transmission};
    use super::*;

    fn driver() -> (FakeBus, Hd44780<fake::FakePin, fake::FakeDelay>) {
        let bus = FakeBus::new();
        let driver = Hd44780::new(bus.pins(), bus.delay()).unwrap();
        bus.clear_events();
        (bus, driver)
    }

    fn instruction(bytes: &[u8]) -> Transmission {
        Transmission {
            register: Register::Instruction,
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn init_sequence_matches_datasheet_order() {
        let bus = FakeBus::new();
        let _driver = Hd44780::new(bus.pins(), bus.delay()).unwrap();
        assert_eq!(
            bus.transmissions(),
            vec![
                instruction(&[0x30]),
                instruction(&[0x30, 0x30, 0x38, 0x0C, 0x06]),
                instruction(&[0x01]),
            ]
        );
    }

    #[test]
    fn power_on_delay_precedes_any_pin_activity() {
        let bus = FakeBus::new();
        let _driver = Hd44780::new(bus.pins(), bus.delay()).unwrap();
        let events = bus.events();
        match events.first() {
            Some(BusEvent::Delay { ns }) => {
                assert!(*ns >= 50_000_000, "power-on wait was only {ns} ns")
            }
            other => panic!("expected the power-on wait first, got {other:?}"),
        }
        assert_eq!(
            events.get(1),
            Some(&BusEvent::Set {
                line: Line::Enable,
                high: false
            })
        );
    }

    #[test]
    fn first_reset_command_waits_extended_delay() {
        let bus = FakeBus::new();
        let _driver = Hd44780::new(bus.pins(), bus.delay()).unwrap();
        let delays = bus.delays();
        // power-on, then one byte worth of pulse and execution, then the long settle.
        assert!(delays[0] >= Duration::from_millis(50));
        assert!(delays[1] >= Duration::from_micros(1));
        assert!(delays[2] >= Duration::from_micros(1));
        assert!(delays[3] >= Duration::from_micros(100));
        assert!(delays[4] >= Duration::from_millis(5));
    }

    #[test]
    fn clear_sends_single_command_then_settles() {
        let (bus, mut driver) = driver();
        driver.clear().unwrap();
        assert_eq!(bus.transmissions(), vec![instruction(&[LCD_CLR])]);
        let settle = bus.delays().last().copied();
        assert!(settle >= Some(Duration::from_millis(1)), "clear settle was {settle:?}");
    }

    #[test]
    fn render_clears_then_sends_four_full_rows() {
        let (bus, mut driver) = driver();
        driver.render(Some("hi")).unwrap();
        let sent = bus.transmissions();
        assert_eq!(sent.len(), 5);
        assert_eq!(sent[0], instruction(&[LCD_CLR]));
        for row in &sent[1..] {
            assert_eq!(row.register, Register::Data);
            assert_eq!(row.bytes.len(), frame::WIDTH);
        }
        assert_eq!(&sent[1].bytes[..3], b"hi ");
    }

    #[test]
    fn render_transmits_rows_in_physical_order() {
        let (bus, mut driver) = driver();
        driver.render(Some("AAAA\nBBBB\nCCCC\nDDDD")).unwrap();
        let firsts: Vec<u8> = bus.transmissions()[1..]
            .iter()
            .map(|t| t.bytes[0])
            .collect();
        assert_eq!(firsts, b"ACBD");
        assert_eq!(
            bus.screen(),
            ["AAAA", "BBBB", "CCCC", "DDDD"].map(|row| format!("{row:<20}"))
        );
    }

    #[test]
    fn empty_text_renders_blank_rows() {
        let (bus, mut driver) = driver();
        driver.render(Some("")).unwrap();
        let sent = bus.transmissions();
        assert_eq!(sent.len(), 5);
        for row in &sent[1..] {
            assert_eq!(row.bytes, vec![b' '; frame::WIDTH]);
        }
    }

    #[test]
    fn invalid_text_never_touches_the_bus() {
        let (bus, mut driver) = driver();
        let too_long = "x".repeat(frame::WIDTH + 1);
        for text in [None, Some("1\n2\n3\n4\n5"), Some(too_long.as_str())] {
            let err = driver.render(text).err().expect("frame should be rejected");
            assert!(matches!(err, Error::Frame(_)), "unexpected error: {err}");
        }
        assert!(bus.events().is_empty());
    }

    #[test]
    fn render_is_repeatable() {
        let (bus, mut driver) = driver();
        driver.render(Some("same\ntext")).unwrap();
        let first = bus.events();
        bus.clear_events();
        driver.render(Some("same\ntext")).unwrap();
        assert_eq!(first, bus.events());
    }

    #[test]
    fn render_chains() {
        let (bus, mut driver) = driver();
        driver.render(Some("a")).unwrap().render(Some("b")).unwrap();
        assert_eq!(bus.transmissions().len(), 10);
    }

    #[test]
    fn data_lines_carry_bits_lsb_first() {
        let (bus, mut driver) = driver();
        for byte in [0x00u8, 0xFF, 0x55, 0xAA] {
            bus.clear_events();
            driver.send(Register::Data, &[byte]).unwrap();
            let levels = bus.data_levels();
            for (bit, level) in levels.iter().enumerate() {
                assert_eq!(*level, (byte >> bit) & 1 == 1, "byte {byte:#04x} bit {bit}");
            }
            assert_eq!(bus.transmissions()[0].bytes, vec![byte]);
        }
    }

    #[test]
    fn mode_line_is_set_once_per_batch() {
        let (bus, mut driver) = driver();
        driver.send(Register::Data, b"abc").unwrap();
        let mode_writes = bus
            .events()
            .iter()
            .filter(|e| matches!(e, BusEvent::Set { line: Line::Mode, .. }))
            .count();
        assert_eq!(mode_writes, 1);
        assert_eq!(
            bus.events()[0],
            BusEvent::Set {
                line: Line::Mode,
                high: true
            }
        );
    }

    #[test]
    fn enable_pulse_and_execution_delay_meet_floor() {
        let (bus, mut driver) = driver();
        driver.send(Register::Instruction, &[0x0C, 0x06]).unwrap();
        let events = bus.events();
        let enable_writes: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, BusEvent::Set { line: Line::Enable, .. }))
            .map(|(idx, _)| idx)
            .collect();
        assert_eq!(enable_writes.len(), 6);
        for pulse in enable_writes.chunks(3) {
            for pair in pulse.windows(2) {
                let held: u32 = events[pair[0]..pair[1]]
                    .iter()
                    .filter_map(|e| match e {
                        BusEvent::Delay { ns } => Some(*ns),
                        _ => None,
                    })
                    .sum();
                assert!(held >= 1_000, "enable held for only {held} ns");
            }
            match events[pulse[2] + 1] {
                BusEvent::Delay { ns } => {
                    assert!(ns >= 100_000, "execution wait was only {ns} ns")
                }
                other => panic!("expected an execution wait after the strobe, got {other:?}"),
            }
        }
        assert_eq!(bus.strobe_violations(), 0);
    }

    #[test]
    fn drop_releases_every_line_low() {
        let (bus, mut driver) = driver();
        driver.send(Register::Data, &[0xFF]).unwrap();
        drop(driver);
        assert!(bus.data_levels().iter().all(|high| !high));
        assert!(bus.events().ends_with(&[
            BusEvent::Set {
                line: Line::Mode,
                high: false
            },
            BusEvent::Set {
                line: Line::Enable,
                high: false
            },
        ]));
    }

    #[test]
    fn default_pins_are_valid() {
        BusPins::default().validate().unwrap();
    }

    #[test]
    fn rejects_shared_pin() {
        let pins = BusPins {
            enable: DEFAULT_DATA_PINS[3],
            ..BusPins::default()
        };
        let err = pins.validate().unwrap_err();
        assert!(format!("{err}").contains("already assigned to d3"));
    }

    #[test]
    fn rejects_pin_outside_header() {
        let pins = BusPins {
            mode: 40,
            ..BusPins::default()
        };
        let err = pins.validate().unwrap_err();
        assert!(format!("{err}").contains("not a BCM GPIO"));
    }
}
