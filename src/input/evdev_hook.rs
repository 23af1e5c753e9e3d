//! Global key hook via evdev
//!
//! Reads every keyboard under `/dev/input` directly, so keys are seen no
//! matter which window has focus. Needs read access to the event nodes
//! (usually membership in the `input` group).

use async_trait::async_trait;
use evdev::{Device, InputEventKind, Key as EvKey};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{InputError, InputSource, Key, KeyAction, KeyEvent};
use crate::keys::KeyId;

/// Main-row and keypad codes for digits 0-7
const DIGITS: [(EvKey, EvKey); 8] = [
    (EvKey::KEY_0, EvKey::KEY_KP0),
    (EvKey::KEY_1, EvKey::KEY_KP1),
    (EvKey::KEY_2, EvKey::KEY_KP2),
    (EvKey::KEY_3, EvKey::KEY_KP3),
    (EvKey::KEY_4, EvKey::KEY_KP4),
    (EvKey::KEY_5, EvKey::KEY_KP5),
    (EvKey::KEY_6, EvKey::KEY_KP6),
    (EvKey::KEY_7, EvKey::KEY_KP7),
];

/// Key events from all keyboards on the system
pub struct EvdevInput {
    rx: mpsc::UnboundedReceiver<KeyEvent>,
}

impl EvdevInput {
    /// Open every readable keyboard and start one reader thread per device
    pub fn open() -> Result<Self, InputError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut count = 0usize;

        for (path, device) in evdev::enumerate() {
            let is_keyboard = device
                .supported_keys()
                .is_some_and(|keys| keys.contains(EvKey::KEY_0) && keys.contains(EvKey::KEY_Q));
            if !is_keyboard {
                continue;
            }

            info!(
                "Listening on {} ({})",
                path.display(),
                device.name().unwrap_or("unnamed")
            );
            let tx = tx.clone();
            std::thread::Builder::new()
                .name(format!("evdev-{count}"))
                .spawn(move || read_device(device, tx))?;
            count += 1;
        }

        if count == 0 {
            return Err(InputError::NoKeyboards);
        }
        Ok(Self { rx })
    }
}

/// Blocking reader; exits when the device vanishes or the receiver is gone
fn read_device(mut device: Device, tx: mpsc::UnboundedSender<KeyEvent>) {
    loop {
        let events = match device.fetch_events() {
            Ok(events) => events,
            Err(e) => {
                warn!("Keyboard read failed: {}", e);
                return;
            }
        };
        for event in events {
            if let InputEventKind::Key(code) = event.kind() {
                if let Some(key_event) = translate(code, event.value()) {
                    if tx.send(key_event).is_err() {
                        debug!("Input receiver dropped, reader exiting");
                        return;
                    }
                }
            }
        }
    }
}

/// Normalize an evdev key event. Value 0 = up, 1 = down, 2 = auto-repeat.
fn translate(code: EvKey, value: i32) -> Option<KeyEvent> {
    let key = if code == EvKey::KEY_ESC || code == EvKey::KEY_Q {
        Key::Quit
    } else {
        let digit = DIGITS
            .iter()
            .position(|&(main, keypad)| code == main || code == keypad)?;
        Key::Digit(KeyId::new(digit as u8)?)
    };
    let action = match value {
        0 => KeyAction::Release,
        1 | 2 => KeyAction::Press,
        _ => return None,
    };
    Some(KeyEvent { key, action })
}

#[async_trait]
impl InputSource for EvdevInput {
    async fn next_event(&mut self) -> Option<KeyEvent> {
        self.rx.recv().await
    }

    fn name(&self) -> &'static str {
        "global"
    }
}
