//! Link error types

use thiserror::Error;

/// Errors that can occur while finding, opening or writing to a link
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("No serial port found: {0}")]
    PortNotFound(String),

    #[error("Failed to open {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("Serial write failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("Link closed")]
    Closed,

    #[error("Serial error: {0}")]
    Serial(String),
}

impl From<serialport::Error> for LinkError {
    fn from(e: serialport::Error) -> Self {
        LinkError::Serial(e.to_string())
    }
}
