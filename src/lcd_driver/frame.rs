//! Text validation and layout for the 20x4 panel.

use std::fmt;

pub const WIDTH: usize = 20;
pub const HEIGHT: usize = 4;

/// Transmission order of the logical rows. The controller's DDRAM wraps
/// row 0 into row 2 and row 1 into row 3, so a straight 80-byte stream
/// lands on rows 0, 2, 1, 3.
pub const PHYSICAL_ORDER: [usize; HEIGHT] = [0, 2, 1, 3];

/// Why a piece of text cannot be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    NoInput,
    TooManyLines { count: usize },
    LineTooLong { line: usize, len: usize },
}

impl FrameError {
    /// Index of the offending row, when one row is to blame.
    pub fn line(&self) -> Option<usize> {
        match self {
            FrameError::NoInput | FrameError::TooManyLines { .. } => None,
            FrameError::LineTooLong { line, .. } => Some(*line),
        }
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::NoInput => write!(f, "no text supplied"),
            FrameError::TooManyLines { count } => {
                write!(f, "text has {count} lines, at most {HEIGHT} fit")
            }
            FrameError::LineTooLong { line, len } => write!(
                f,
                "line {line} is {len} characters long, at most {WIDTH} fit"
            ),
        }
    }
}

impl std::error::Error for FrameError {}

/// A validated screenful: always exactly `HEIGHT` rows of at most `WIDTH` chars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    rows: [String; HEIGHT],
}

impl Frame {
    pub fn parse(text: Option<&str>) -> Result<Self, FrameError> {
        let text = text.ok_or(FrameError::NoInput)?;
        let normalized = normalize_newlines(text);
        let lines: Vec<&str> = normalized.split('\n').collect();

        if lines.len() > HEIGHT {
            return Err(FrameError::TooManyLines { count: lines.len() });
        }
        for (line, content) in lines.iter().enumerate() {
            let len = content.chars().count();
            if len > WIDTH {
                return Err(FrameError::LineTooLong { line, len });
            }
        }

        let mut rows: [String; HEIGHT] = Default::default();
        for (slot, content) in rows.iter_mut().zip(lines) {
            *slot = content.to_string();
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[String; HEIGHT] {
        &self.rows
    }

    /// Rows in the order the controller expects them on the wire.
    pub fn physical_rows(&self) -> [&str; HEIGHT] {
        PHYSICAL_ORDER.map(|idx| self.rows[idx].as_str())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rows.join("\n"))
    }
}

/// Fold `\r\n`, `\n\r`, `\n` and `\r` into a single `\n`.
pub fn normalize_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                chars.next_if_eq(&'\n');
                out.push('\n');
            }
            '\n' => {
                chars.next_if_eq(&'\r');
                out.push('\n');
            }
            other => out.push(other),
        }
    }
    out
}

/// Encode one row as exactly `WIDTH` controller bytes, space padded.
///
/// Characters map to the low byte of their scalar value, so `'\u{FF}'`
/// selects the ROM's solid block.
pub fn encode_row(row: &str) -> [u8; WIDTH] {
    let mut bytes = [b' '; WIDTH];
    for (slot, ch) in bytes.iter_mut().zip(row.chars()) {
        *slot = (u32::from(ch) & 0xFF) as u8;
    }
    bytes
}
