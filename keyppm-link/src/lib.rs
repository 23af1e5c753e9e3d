//! Serial link layer for keyppm
//!
//! This crate owns everything between a finished channel line and the wire:
//!
//! - `ChannelTransmitter`: the byte-stream sink the control loop writes to
//! - `SerialTransmitter`: a USB serial PPM encoder (Arduino / Pro Micro)
//! - `NullTransmitter`, `LogTransmitter`, `MemoryTransmitter`: stand-ins for
//!   a missing device, dry runs and tests
//! - port discovery with the "Arduino-ish" heuristic

pub mod discovery;
pub mod error;
pub mod serial;
pub mod transmitter;

pub use discovery::{list_ports, locate, pick, PortCandidate};
pub use error::LinkError;
pub use serial::SerialTransmitter;
pub use transmitter::{
    ChannelTransmitter, LogTransmitter, MemoryTransmitter, NullTransmitter, SentLines,
};

/// Default symbol rate of the PPM encoder sketch
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
