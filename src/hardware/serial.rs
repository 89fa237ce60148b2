use std::io::ErrorKind;
use std::time::Duration;

use log::info;
use serialport::SerialPort;

use super::{HardwareError, HardwareInputSource, LineDecoder};
use crate::model::party::PartyId;

/// Vote codes from a serial-attached ballot device (e.g. an Arduino button
/// panel). Port path and baud rate come from configuration.
pub struct SerialInput {
    port: Box<dyn SerialPort>,
    decoder: LineDecoder,
}

impl SerialInput {
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, HardwareError> {
        let port = serialport::new(path, baud_rate)
            // Near-zero timeout keeps reads non-blocking; `poll` must never
            // stall the session scheduler.
            .timeout(Duration::from_millis(1))
            .open()
            .map_err(|err| HardwareError::Open(format!("{path}: {err}")))?;
        info!("ballot device online at {path} ({baud_rate} baud)");
        Ok(Self {
            port,
            decoder: LineDecoder::default(),
        })
    }
}

impl HardwareInputSource for SerialInput {
    fn poll(&mut self) -> Result<Option<PartyId>, HardwareError> {
        let mut chunk = [0u8; 256];
        loop {
            match self.port.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.decoder.push(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::TimedOut => break,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(self.decoder.next_code())
    }
}
