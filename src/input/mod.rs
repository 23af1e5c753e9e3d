//! Input sources and key normalization
//!
//! Every source (focused terminal, global evdev hook, scripted replay) yields
//! the same canonical `KeyEvent`s. Downstream code never knows which source
//! is active.

mod script;
mod terminal;

#[cfg(all(target_os = "linux", feature = "global-hook"))]
mod evdev_hook;

pub use script::ScriptedInput;
pub use terminal::TerminalInput;

#[cfg(all(target_os = "linux", feature = "global-hook"))]
pub use evdev_hook::EvdevInput;

use async_trait::async_trait;
use thiserror::Error;

use crate::keys::KeyId;

/// Canonical key identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Digit(KeyId),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Press,
    Release,
}

/// A normalized press or release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub action: KeyAction,
}

impl KeyEvent {
    pub fn press(key: Key) -> Self {
        Self {
            key,
            action: KeyAction::Press,
        }
    }

    pub fn release(key: Key) -> Self {
        Self {
            key,
            action: KeyAction::Release,
        }
    }

    /// Digit event; `None` for digits above 7
    pub fn digit(digit: u8, action: KeyAction) -> Option<Self> {
        KeyId::new(digit).map(|key| Self {
            key: Key::Digit(key),
            action,
        })
    }
}

/// Errors from opening or reading an input source
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Replay script line {line}: {message}")]
    Script { line: usize, message: String },
    #[error("No keyboard devices found under /dev/input")]
    NoKeyboards,
    #[error("Global key hook is not available on this build")]
    HookUnavailable,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Map a typed character to a key. Case-insensitive; `q` quits.
pub fn normalize_char(c: char) -> Option<Key> {
    match c.to_ascii_lowercase() {
        'q' => Some(Key::Quit),
        d @ '0'..='7' => KeyId::new(d as u8 - b'0').map(Key::Digit),
        _ => None,
    }
}

/// Map a key name (`"4"`, `"kp4"`, `"Escape"`, `"q"`) to a key
///
/// Numeric-pad names fold to their base digit.
pub fn normalize_name(name: &str) -> Option<Key> {
    let lower = name.trim().to_ascii_lowercase();
    match lower.as_str() {
        "escape" | "esc" | "quit" => return Some(Key::Quit),
        _ => {}
    }
    let base = ["kp_", "kp", "numpad", "keypad"]
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))
        .unwrap_or(&lower);
    let mut chars = base.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => normalize_char(c),
        _ => None,
    }
}

/// A stream of normalized key events
#[async_trait]
pub trait InputSource: Send {
    /// Next event, or `None` once the source is exhausted
    async fn next_event(&mut self) -> Option<KeyEvent>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

#[async_trait]
impl InputSource for Box<dyn InputSource> {
    async fn next_event(&mut self) -> Option<KeyEvent> {
        (**self).next_event().await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
