//! The sink side of the control loop
//!
//! A `ChannelTransmitter` receives complete, newline-terminated channel lines
//! and is expected to deliver-or-fail per call. There is no acknowledgement.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::LinkError;

/// Byte-stream sink for channel lines
pub trait ChannelTransmitter: Send {
    /// Write one line (including its trailing `\n`)
    fn send_line(&mut self, line: &str) -> Result<(), LinkError>;

    /// Close the underlying link; further sends fail with `LinkError::Closed`
    fn close(&mut self) -> Result<(), LinkError>;

    /// Human-readable description for logs and the status bar
    fn describe(&self) -> String;

    /// Whether a real device sits behind this transmitter
    fn is_connected(&self) -> bool {
        true
    }
}

impl ChannelTransmitter for Box<dyn ChannelTransmitter> {
    fn send_line(&mut self, line: &str) -> Result<(), LinkError> {
        (**self).send_line(line)
    }

    fn close(&mut self) -> Result<(), LinkError> {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

/// Used when no device could be opened: every send is a silent no-op
#[derive(Debug, Default)]
pub struct NullTransmitter {
    warned: bool,
}

impl NullTransmitter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChannelTransmitter for NullTransmitter {
    fn send_line(&mut self, _line: &str) -> Result<(), LinkError> {
        if !self.warned {
            warn!("No serial device attached, channel updates are not transmitted");
            self.warned = true;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    fn describe(&self) -> String {
        "no device".to_string()
    }

    fn is_connected(&self) -> bool {
        false
    }
}

/// Dry-run transmitter: logs each line instead of writing it anywhere
#[derive(Debug, Default)]
pub struct LogTransmitter;

impl ChannelTransmitter for LogTransmitter {
    fn send_line(&mut self, line: &str) -> Result<(), LinkError> {
        info!("dry-run -> {}", line.trim_end());
        Ok(())
    }

    fn close(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    fn describe(&self) -> String {
        "dry run".to_string()
    }
}

#[derive(Debug, Default)]
struct MemoryLog {
    lines: Vec<String>,
    pending_failures: usize,
    attempts: usize,
    closed: bool,
}

/// Shared view into a `MemoryTransmitter`, kept by the caller after the
/// transmitter itself has been handed to the control loop
#[derive(Debug, Clone, Default)]
pub struct SentLines {
    log: Arc<Mutex<MemoryLog>>,
}

impl SentLines {
    /// Lines that were successfully "written", without the trailing newline
    pub fn lines(&self) -> Vec<String> {
        self.log.lock().lines.clone()
    }

    /// Total number of write attempts, failed ones included
    pub fn attempts(&self) -> usize {
        self.log.lock().attempts
    }

    /// Make the next `count` writes fail
    pub fn fail_next(&self, count: usize) {
        self.log.lock().pending_failures = count;
    }

    pub fn is_closed(&self) -> bool {
        self.log.lock().closed
    }
}

/// In-memory transmitter with failure injection
#[derive(Debug, Default)]
pub struct MemoryTransmitter {
    log: SentLines,
}

impl MemoryTransmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for inspecting what was sent
    pub fn handle(&self) -> SentLines {
        self.log.clone()
    }
}

impl ChannelTransmitter for MemoryTransmitter {
    fn send_line(&mut self, line: &str) -> Result<(), LinkError> {
        let mut log = self.log.log.lock();
        if log.closed {
            return Err(LinkError::Closed);
        }
        log.attempts += 1;
        if log.pending_failures > 0 {
            log.pending_failures -= 1;
            return Err(LinkError::Write(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "injected failure",
            )));
        }
        log.lines.push(line.trim_end_matches('\n').to_string());
        Ok(())
    }

    fn close(&mut self) -> Result<(), LinkError> {
        self.log.log.lock().closed = true;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_records_lines_without_newline() {
        let mut tx = MemoryTransmitter::new();
        let handle = tx.handle();
        tx.send_line("2000,1500,1500,1500,1500,1500,1500,1500\n").unwrap();
        assert_eq!(
            handle.lines(),
            vec!["2000,1500,1500,1500,1500,1500,1500,1500".to_string()]
        );
        assert_eq!(handle.attempts(), 1);
    }

    #[test]
    fn test_memory_injected_failures() {
        let mut tx = MemoryTransmitter::new();
        let handle = tx.handle();
        handle.fail_next(1);
        assert!(matches!(tx.send_line("a\n"), Err(LinkError::Write(_))));
        assert!(tx.send_line("b\n").is_ok());
        assert_eq!(handle.lines(), vec!["b".to_string()]);
        assert_eq!(handle.attempts(), 2);
    }

    #[test]
    fn test_memory_rejects_after_close() {
        let mut tx = MemoryTransmitter::new();
        let handle = tx.handle();
        tx.close().unwrap();
        assert!(handle.is_closed());
        assert!(matches!(tx.send_line("a\n"), Err(LinkError::Closed)));
    }

    #[test]
    fn test_null_is_silent_noop() {
        let mut tx = NullTransmitter::new();
        assert!(tx.send_line("1500\n").is_ok());
        assert!(tx.send_line("1500\n").is_ok());
        assert!(!tx.is_connected());
    }

    #[test]
    fn test_boxed_transmitter_delegates() {
        let mem = MemoryTransmitter::new();
        let handle = mem.handle();
        let mut boxed: Box<dyn ChannelTransmitter> = Box::new(mem);
        boxed.send_line("x\n").unwrap();
        assert_eq!(boxed.describe(), "memory");
        assert_eq!(handle.lines(), vec!["x".to_string()]);
    }
}
