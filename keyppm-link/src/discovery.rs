//! Serial port discovery
//!
//! The encoder is a stock Arduino-class board, so there is no fixed VID/PID to
//! match on. Candidates are picked by name and description instead.

use serialport::SerialPortType;
use tracing::{info, warn};

use crate::error::LinkError;

/// Substrings in a port name that usually mean "USB CDC board"
const NAME_HINTS: &[&str] = &["usbmodem", "usbserial", "ttyACM", "ttyUSB"];

/// A serial port as reported by the OS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    pub name: String,
    pub description: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

impl PortCandidate {
    /// Heuristic: does this look like an Arduino-ish board?
    pub fn is_arduino_like(&self) -> bool {
        let described = self
            .description
            .as_deref()
            .is_some_and(|d| d.contains("Arduino"));
        described || NAME_HINTS.iter().any(|hint| self.name.contains(hint))
    }
}

impl std::fmt::Display for PortCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_id = |id: Option<u16>| match id {
            Some(v) => format!("{v:#06x}"),
            None => "-".to_string(),
        };
        write!(
            f,
            "{} | {} | VID={} PID={}",
            self.name,
            self.description.as_deref().unwrap_or(""),
            fmt_id(self.vid),
            fmt_id(self.pid)
        )
    }
}

/// List all serial ports the OS knows about
pub fn list_ports() -> Result<Vec<PortCandidate>, LinkError> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| match p.port_type {
            SerialPortType::UsbPort(usb) => PortCandidate {
                name: p.port_name,
                description: usb.product.or(usb.manufacturer),
                vid: Some(usb.vid),
                pid: Some(usb.pid),
            },
            _ => PortCandidate {
                name: p.port_name,
                description: None,
                vid: None,
                pid: None,
            },
        })
        .collect())
}

/// Pick a port from `candidates`: the last Arduino-like one wins
pub fn pick(candidates: &[PortCandidate]) -> Option<&PortCandidate> {
    candidates.iter().rev().find(|c| c.is_arduino_like())
}

/// Resolve the port to open
///
/// An explicit name is used as-is. Otherwise every port is logged and the
/// heuristic picks one.
pub fn locate(explicit: Option<&str>) -> Result<String, LinkError> {
    if let Some(name) = explicit {
        return Ok(name.to_string());
    }

    let candidates = list_ports()?;
    if candidates.is_empty() {
        return Err(LinkError::PortNotFound("no serial ports present".into()));
    }

    info!("Available serial ports:");
    for c in &candidates {
        info!("  {}", c);
    }

    match pick(&candidates) {
        Some(c) => {
            info!("Using serial port: {}", c.name);
            Ok(c.name.clone())
        }
        None => {
            warn!("No Arduino-like serial device found by heuristic");
            Err(LinkError::PortNotFound(
                "no Arduino-like serial device".into(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, description: Option<&str>) -> PortCandidate {
        PortCandidate {
            name: name.to_string(),
            description: description.map(str::to_string),
            vid: None,
            pid: None,
        }
    }

    #[test]
    fn test_heuristic_matches_names_and_descriptions() {
        assert!(port("/dev/cu.usbmodem101", None).is_arduino_like());
        assert!(port("/dev/ttyACM0", None).is_arduino_like());
        assert!(port("COM3", Some("Arduino Leonardo")).is_arduino_like());
        assert!(!port("/dev/ttyS0", None).is_arduino_like());
        assert!(!port("COM1", Some("Communications Port")).is_arduino_like());
    }

    #[test]
    fn test_pick_prefers_last_match() {
        let ports = vec![
            port("/dev/ttyACM0", None),
            port("/dev/ttyS0", None),
            port("/dev/ttyUSB1", None),
        ];
        assert_eq!(pick(&ports).map(|p| p.name.as_str()), Some("/dev/ttyUSB1"));
    }

    #[test]
    fn test_pick_none_when_no_match() {
        let ports = vec![port("/dev/ttyS0", None)];
        assert!(pick(&ports).is_none());
    }

    #[test]
    fn test_explicit_port_bypasses_discovery() {
        assert_eq!(locate(Some("/dev/ttyFAKE")).unwrap(), "/dev/ttyFAKE");
    }

    #[test]
    fn test_display_formats_ids() {
        let mut p = port("/dev/ttyACM0", Some("Arduino Micro"));
        p.vid = Some(0x2341);
        p.pid = Some(0x8037);
        assert_eq!(
            p.to_string(),
            "/dev/ttyACM0 | Arduino Micro | VID=0x2341 PID=0x8037"
        );
    }
}
