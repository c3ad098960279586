//! Operator commands over a serial port: line assembly, and matching a line to
//! a probe and a calibration step.

use embedded_hal::serial;
use heapless::{String, Vec};

use crate::{
    calibration::{CalMode, Target},
    SensorError,
};

/// Longest command, in bytes. The rest of a longer line is dropped.
pub const LINE_CAPACITY: usize = 9;

/// A partial line older than this is discarded when the next byte arrives.
pub const RECEIVE_TIMEOUT_MS: u64 = 500;

pub type Line = String<LINE_CAPACITY>;

// Checked in order: the first command found anywhere in the line wins.
const VOCABULARY: [(&str, Target, CalMode); 9] = [
    ("ENTERPH", Target::Ph, CalMode::Enter),
    ("EXITPH", Target::Ph, CalMode::Exit),
    ("CALPH", Target::Ph, CalMode::Confirm),
    ("ENTERTDS", Target::Tds, CalMode::Enter),
    ("EXITTDS", Target::Tds, CalMode::Exit),
    ("CALTDS", Target::Tds, CalMode::Confirm),
    ("ENTEREC", Target::Ec, CalMode::Enter),
    ("EXITEC", Target::Ec, CalMode::Exit),
    ("CALEC", Target::Ec, CalMode::Confirm),
];

/// Map an upper-case line to the probe and step it names.
pub fn parse(line: &str) -> Option<(Target, CalMode)> {
    VOCABULARY
        .iter()
        .find(|(cmd, _, _)| line.contains(cmd))
        .map(|(_, target, mode)| (*target, *mode))
}

/// Assembles bytes from a serial port into upper-case lines.
#[derive(Debug, Default)]
pub struct LineReader {
    buf: Vec<u8, LINE_CAPACITY>,
    last_rx_ms: Option<u64>,
    // Set once a line fills the buffer; bytes are dropped until its `\n`.
    discarding: bool,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes buffered towards the next line.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Drain the bytes the port has ready. Returns a line once one completes:
    /// on `\n`, or once `LINE_CAPACITY` bytes are buffered. In the second case
    /// the remainder of that line is read and dropped, on this call or later
    /// ones. Bytes after a completed line stay in the port for the next call.
    pub fn poll<R: serial::Read<u8>>(
        &mut self,
        serial: &mut R,
        now_ms: u64,
    ) -> Result<Option<Line>, SensorError> {
        loop {
            let byte = match serial.read() {
                Ok(b) => b,
                Err(nb::Error::WouldBlock) => return Ok(None),
                Err(nb::Error::Other(_)) => {
                    self.buf.clear();
                    self.discarding = false;
                    return Err(SensorError::Bus);
                }
            };

            if let Some(last) = self.last_rx_ms {
                if now_ms.saturating_sub(last) > RECEIVE_TIMEOUT_MS {
                    self.buf.clear();
                    self.discarding = false;
                }
            }
            self.last_rx_ms = Some(now_ms);

            match byte {
                b'\n' if self.discarding => self.discarding = false,
                _ if self.discarding => (),
                b'\n' => return Ok(Some(self.take())),
                b'\r' => (),
                b => {
                    let b = if b.is_ascii() { b.to_ascii_uppercase() } else { b'?' };
                    // Can't overflow: a full buffer is always taken below.
                    self.buf.push(b).ok();
                    if self.buf.is_full() {
                        self.discarding = true;
                        return Ok(Some(self.take()));
                    }
                }
            }
        }
    }

    fn take(&mut self) -> Line {
        let bytes = core::mem::take(&mut self.buf);
        // Only ASCII is ever buffered.
        String::from_utf8(bytes).unwrap_or_default()
    }
}
