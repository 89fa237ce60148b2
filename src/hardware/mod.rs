//! Vote-code acquisition from the ballot input device.
//!
//! The device speaks a line-oriented ASCII protocol: each line it sends is
//! the decimal id of the chosen party. Anything else is discarded. Sources
//! are strictly non-blocking; the session controller polls them on a fixed
//! tick so that it stays responsive to cancellation while a voter is at the
//! device.

mod serial;

pub use serial::SerialInput;

use log::debug;
use thiserror::Error;

use crate::model::party::PartyId;

/// Unparsed input is capped so a chattering device cannot grow the buffer
/// without bound.
const MAX_PENDING_BYTES: usize = 4096;

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("failed to open ballot device: {0}")]
    Open(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A non-blocking source of vote codes.
///
/// `poll` returns whatever complete code has arrived since the last call, if
/// any; it never waits for the device.
pub trait HardwareInputSource: Send {
    fn poll(&mut self) -> Result<Option<PartyId>, HardwareError>;
}

/// Accumulates raw device bytes and yields one decoded code per complete
/// line. Lines that are not a decimal party id are dropped, not errors.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        if self.pending.len() > MAX_PENDING_BYTES && !self.pending.contains(&b'\n') {
            debug!("discarding {} bytes of unterminated device input", self.pending.len());
            self.pending.clear();
        }
    }

    /// Pop the next decoded code, skipping unrecognised lines.
    pub fn next_code(&mut self) -> Option<PartyId> {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = match std::str::from_utf8(&line[..line.len() - 1]) {
                Ok(text) => text.trim(),
                Err(_) => continue,
            };
            match text.parse::<PartyId>() {
                Ok(code) => return Some(code),
                Err(_) => {
                    if !text.is_empty() {
                        debug!("ignoring unrecognised device line {text:?}");
                    }
                }
            }
        }
        None
    }
}
