//! USB serial transmitter for the PPM encoder

use std::io::Write;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::LinkError;
use crate::transmitter::ChannelTransmitter;

/// An opened serial port speaking the line protocol
pub struct SerialTransmitter {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
    baud_rate: u32,
}

impl SerialTransmitter {
    /// Open `name` at `baud_rate`
    ///
    /// `timeout` bounds every write, so a wedged device can stall at most one
    /// control tick.
    pub fn open(name: &str, baud_rate: u32, timeout: Duration) -> Result<Self, LinkError> {
        let port = serialport::new(name, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| LinkError::Open {
                port: name.to_string(),
                reason: e.to_string(),
            })?;
        info!("Connected to {} @ {} baud", name, baud_rate);
        Ok(Self {
            port: Some(port),
            name: name.to_string(),
            baud_rate,
        })
    }
}

impl std::fmt::Debug for SerialTransmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransmitter")
            .field("name", &self.name)
            .field("baud_rate", &self.baud_rate)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl ChannelTransmitter for SerialTransmitter {
    fn send_line(&mut self, line: &str) -> Result<(), LinkError> {
        let port = self.port.as_mut().ok_or(LinkError::Closed)?;
        port.write_all(line.as_bytes()).map_err(LinkError::Write)?;
        port.flush().map_err(LinkError::Write)?;
        debug!("-> {}", line.trim_end());
        Ok(())
    }

    fn close(&mut self) -> Result<(), LinkError> {
        if self.port.take().is_some() {
            info!("Closed {}", self.name);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} @ {}", self.name, self.baud_rate)
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}
