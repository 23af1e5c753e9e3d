//! TUI view state

use crate::config::{ControllerConfig, PulseRange};
use crate::frame::CHANNEL_COUNT;
use crate::state::{ControlEvent, Snapshot};

/// Serial link status shown in the status bar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    pub description: String,
    pub connected: bool,
}

/// Static description of one channel row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRow {
    pub name: String,
    pub kind: &'static str,
}

/// Everything the renderer draws. Never touches controller state.
#[derive(Debug, Clone)]
pub struct App {
    pub snapshot: Snapshot,
    pub rows: Vec<ChannelRow>,
    pub range: PulseRange,
    pub neutral_us: u16,
    /// Footer line listing the configured keys
    pub help: String,
    pub link: LinkStatus,
    /// Last notable event (send failure, arm cue)
    pub status_message: Option<String>,
    pub sent_count: u64,
    pub failed_count: u64,
    pub should_quit: bool,
    bell: bool,
}

impl App {
    pub fn new(config: &ControllerConfig, link: LinkStatus, snapshot: Snapshot) -> Self {
        let rows = config
            .channels
            .iter()
            .enumerate()
            .take(CHANNEL_COUNT)
            .map(|(i, ch)| {
                let keys: Vec<String> = ch
                    .policy
                    .keys()
                    .iter()
                    .map(|(k, _)| k.to_string())
                    .collect();
                let name = match (&ch.label, keys.is_empty()) {
                    (Some(label), _) => label.clone(),
                    (None, false) => format!("Key {}", keys.join("/")),
                    (None, true) => format!("CH{}", i + 1),
                };
                ChannelRow {
                    name,
                    kind: ch.policy.kind(),
                }
            })
            .collect();

        Self {
            snapshot,
            rows,
            range: config.range,
            neutral_us: config.neutral_us,
            help: config.help_text(),
            link,
            status_message: None,
            sent_count: 0,
            failed_count: 0,
            should_quit: false,
            bell: false,
        }
    }

    pub fn update(&mut self, snapshot: Snapshot) {
        self.snapshot = snapshot;
    }

    pub fn handle_control_event(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Armed => {
                self.bell = true;
                self.status_message = Some("Armed: press a protected key".to_string());
            }
            ControlEvent::Authorized(key) => {
                self.status_message = Some(format!("Gesture {key} authorized"));
            }
            ControlEvent::Denied(key) => {
                self.status_message = Some(format!("Need 0 → {key} to execute"));
            }
            ControlEvent::Sent(_) => self.sent_count += 1,
            ControlEvent::SendFailed(msg) => {
                self.failed_count += 1;
                self.status_message = Some(format!("Send failed: {msg}"));
            }
            ControlEvent::Quit => self.should_quit = true,
        }
    }

    /// Whether the terminal bell should ring now; clears the request
    pub fn take_bell(&mut self) -> bool {
        std::mem::take(&mut self.bell)
    }

    /// Bar fill for channel `index` as 0.0-1.0 of the pulse range
    pub fn channel_ratio(&self, index: usize) -> f64 {
        self.range.ratio(self.snapshot.channels[index])
    }

    pub fn neutral_ratio(&self) -> f64 {
        self.range.ratio(self.neutral_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SharedState;

    fn app() -> App {
        let config = ControllerConfig::default();
        let state = SharedState::new(&config).unwrap();
        App::new(
            &config,
            LinkStatus {
                description: "memory".to_string(),
                connected: true,
            },
            state.snapshot(),
        )
    }

    #[test]
    fn test_rows_from_config() {
        let app = app();
        assert_eq!(app.rows.len(), CHANNEL_COUNT);
        assert_eq!(app.rows[0].name, "Key 1");
        assert_eq!(app.rows[3].name, "Vibration");
        assert_eq!(app.rows[3].kind, "pulse");
        assert_eq!(app.rows[7].name, "CH8");
    }

    #[test]
    fn test_bell_rings_once_per_arm() {
        let mut app = app();
        assert!(!app.take_bell());
        app.handle_control_event(ControlEvent::Armed);
        assert!(app.take_bell());
        assert!(!app.take_bell());
    }

    #[test]
    fn test_event_counters() {
        let mut app = app();
        app.handle_control_event(ControlEvent::Sent("x".into()));
        app.handle_control_event(ControlEvent::SendFailed("broken pipe".into()));
        assert_eq!(app.sent_count, 1);
        assert_eq!(app.failed_count, 1);
        assert_eq!(app.status_message.as_deref(), Some("Send failed: broken pipe"));
        app.handle_control_event(ControlEvent::Quit);
        assert!(app.should_quit);
    }

    #[test]
    fn test_neutral_sits_mid_bar() {
        let app = app();
        assert!((app.neutral_ratio() - 0.5).abs() < f64::EPSILON);
        assert!((app.channel_ratio(0) - 0.5).abs() < f64::EPSILON);
    }
}
