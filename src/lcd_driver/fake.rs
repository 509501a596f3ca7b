//! Recording stand-in for the GPIO lines and the delay source.
//!
//! Every pin write and every requested delay lands in one shared log, so a
//! test (or `--dry-run`) can decode exactly what the controller would have
//! latched and how long each step was given.

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;
use std::time::Duration;

use embedded_hal::{
    delay::DelayNs,
    digital::{ErrorType, OutputPin},
};

use super::{frame::HEIGHT, frame::WIDTH, ParallelPins, Register};

/// A bus role, as seen by the fake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    Data(u8),
    Mode,
    Enable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    Set { line: Line, high: bool },
    Delay { ns: u32 },
}

/// One `send` call as the controller would have seen it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    pub register: Register,
    pub bytes: Vec<u8>,
}

type Log = Rc<RefCell<Vec<BusEvent>>>;

pub struct FakePin {
    line: Line,
    log: Log,
}

impl ErrorType for FakePin {
    type Error = Infallible;
}

impl OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.log.borrow_mut().push(BusEvent::Set {
            line: self.line,
            high: false,
        });
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.log.borrow_mut().push(BusEvent::Set {
            line: self.line,
            high: true,
        });
        Ok(())
    }
}

/// Records requested delays instead of sleeping.
pub struct FakeDelay {
    log: Log,
}

impl DelayNs for FakeDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.log.borrow_mut().push(BusEvent::Delay { ns });
    }
}

/// Hands out pins and a clock that share one event log.
#[derive(Default, Clone)]
pub struct FakeBus {
    log: Log,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pins(&self) -> ParallelPins<FakePin> {
        let pin = |line| FakePin {
            line,
            log: self.log.clone(),
        };
        ParallelPins {
            data: std::array::from_fn(|bit| pin(Line::Data(bit as u8))),
            mode: pin(Line::Mode),
            enable: pin(Line::Enable),
        }
    }

    pub fn delay(&self) -> FakeDelay {
        FakeDelay {
            log: self.log.clone(),
        }
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.log.borrow().clone()
    }

    pub fn clear_events(&self) {
        self.log.borrow_mut().clear();
    }

    /// Every requested delay, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.log
            .borrow()
            .iter()
            .filter_map(|event| match event {
                BusEvent::Delay { ns } => Some(Duration::from_nanos(u64::from(*ns))),
                BusEvent::Set { .. } => None,
            })
            .collect()
    }

    /// Last level written to each data line, D0 first.
    pub fn data_levels(&self) -> [bool; 8] {
        let mut levels = [false; 8];
        for event in self.log.borrow().iter() {
            if let BusEvent::Set {
                line: Line::Data(bit),
                high,
            } = event
            {
                levels[usize::from(*bit)] = *high;
            }
        }
        levels
    }

    /// Decode the log into transmissions. A new transmission starts at each
    /// RS write; a byte is latched on every falling edge of E.
    pub fn transmissions(&self) -> Vec<Transmission> {
        let mut decoder = Decoder::default();
        let mut out: Vec<Transmission> = Vec::new();
        for event in self.log.borrow().iter() {
            match decoder.apply(*event) {
                Step::ModeSet(register) => out.push(Transmission {
                    register,
                    bytes: Vec::new(),
                }),
                Step::Latched(register, byte) => match out.last_mut() {
                    Some(current) => current.bytes.push(byte),
                    None => out.push(Transmission {
                        register,
                        bytes: vec![byte],
                    }),
                },
                Step::Idle => {}
            }
        }
        out
    }

    /// Number of data-line writes that happened while E was high.
    pub fn strobe_violations(&self) -> usize {
        let mut decoder = Decoder::default();
        for event in self.log.borrow().iter() {
            decoder.apply(*event);
        }
        decoder.violations
    }

    /// Replay the log against a model of the controller's display RAM and
    /// return the four visible rows, top to bottom.
    pub fn screen(&self) -> [String; HEIGHT] {
        let mut ddram = Ddram::default();
        let mut decoder = Decoder::default();
        for event in self.log.borrow().iter() {
            if let Step::Latched(register, byte) = decoder.apply(*event) {
                ddram.latch(register, byte);
            }
        }
        ddram.rows()
    }
}

#[derive(Default)]
struct Decoder {
    data: [bool; 8],
    mode_high: bool,
    enable_high: bool,
    violations: usize,
}

enum Step {
    Idle,
    ModeSet(Register),
    Latched(Register, u8),
}

impl Decoder {
    fn register(&self) -> Register {
        if self.mode_high {
            Register::Data
        } else {
            Register::Instruction
        }
    }

    fn apply(&mut self, event: BusEvent) -> Step {
        match event {
            BusEvent::Delay { .. } => Step::Idle,
            BusEvent::Set {
                line: Line::Data(bit),
                high,
            } => {
                if self.enable_high {
                    self.violations += 1;
                }
                self.data[usize::from(bit)] = high;
                Step::Idle
            }
            BusEvent::Set {
                line: Line::Mode,
                high,
            } => {
                self.mode_high = high;
                Step::ModeSet(self.register())
            }
            BusEvent::Set {
                line: Line::Enable,
                high,
            } => {
                let falling = self.enable_high && !high;
                self.enable_high = high;
                if falling {
                    let byte = self
                        .data
                        .iter()
                        .enumerate()
                        .fold(0u8, |acc, (bit, on)| acc | (u8::from(*on) << bit));
                    Step::Latched(self.register(), byte)
                } else {
                    Step::Idle
                }
            }
        }
    }
}

/// Row start addresses for a 20x4 panel. Row 0 runs on into row 2 and
/// row 1 into row 3.
const ROW_BASE: [usize; HEIGHT] = [0x00, 0x40, 0x14, 0x54];
const LINE_END: [usize; 2] = [0x27, 0x67];

struct Ddram {
    cells: [u8; 0x80],
    addr: usize,
}

impl Default for Ddram {
    fn default() -> Self {
        Self {
            cells: [b' '; 0x80],
            addr: 0,
        }
    }
}

impl Ddram {
    fn latch(&mut self, register: Register, byte: u8) {
        match register {
            Register::Instruction if byte == 0x01 => {
                self.cells = [b' '; 0x80];
                self.addr = 0;
            }
            Register::Instruction if byte & 0x80 != 0 => {
                self.addr = usize::from(byte & 0x7F);
            }
            Register::Instruction => {}
            Register::Data => {
                self.cells[self.addr] = byte;
                self.addr = match self.addr {
                    a if a == LINE_END[0] => 0x40,
                    a if a == LINE_END[1] => 0x00,
                    a => (a + 1) & 0x7F,
                };
            }
        }
    }

    fn rows(&self) -> [String; HEIGHT] {
        ROW_BASE.map(|base| {
            self.cells[base..base + WIDTH]
                .iter()
                .map(|&b| char::from(b))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_strobed_byte() {
        let bus = FakeBus::new();
        let mut pins = bus.pins();
        pins.mode.set_high().unwrap();
        for (bit, pin) in pins.data.iter_mut().enumerate() {
            if (0x41 >> bit) & 1 == 1 {
                pin.set_high().unwrap();
            } else {
                pin.set_low().unwrap();
            }
        }
        pins.enable.set_high().unwrap();
        pins.enable.set_low().unwrap();
        assert_eq!(
            bus.transmissions(),
            vec![Transmission {
                register: Register::Data,
                bytes: vec![0x41],
            }]
        );
        assert!(bus.screen()[0].starts_with('A'));
    }

    #[test]
    fn flags_data_writes_during_strobe() {
        let bus = FakeBus::new();
        let mut pins = bus.pins();
        pins.enable.set_high().unwrap();
        pins.data[0].set_high().unwrap();
        pins.enable.set_low().unwrap();
        assert_eq!(bus.strobe_violations(), 1);
    }

    #[test]
    fn records_requested_delays() {
        let bus = FakeBus::new();
        let mut delay = bus.delay();
        delay.delay_us(100);
        assert_eq!(bus.delays(), vec![Duration::from_micros(100)]);
    }
}
