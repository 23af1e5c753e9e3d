//! Key identities and debounced key state

use serde::{Deserialize, Serialize};

/// Number of digit keys the controller listens to (`0`..`7`)
pub const KEY_COUNT: usize = 8;

/// A digit key `0`..=`7`
///
/// Key `0` is the arm key; `1`..=`7` drive channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct KeyId(u8);

impl KeyId {
    /// The key that arms protected channels
    pub const ARM: KeyId = KeyId(0);

    pub fn new(digit: u8) -> Option<Self> {
        ((digit as usize) < KEY_COUNT).then_some(Self(digit))
    }

    /// Position in per-key arrays
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn digit(self) -> u8 {
        self.0
    }

    pub fn is_arm(self) -> bool {
        self == Self::ARM
    }

    /// All keys in ascending order
    pub fn all() -> impl Iterator<Item = KeyId> {
        (0..KEY_COUNT as u8).map(KeyId)
    }
}

impl TryFrom<u8> for KeyId {
    type Error = String;

    fn try_from(digit: u8) -> Result<Self, Self::Error> {
        KeyId::new(digit).ok_or_else(|| format!("key {digit} out of range 0-{}", KEY_COUNT - 1))
    }
}

impl From<KeyId> for u8 {
    fn from(key: KeyId) -> u8 {
        key.0
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which digit keys are currently held
///
/// Presses are accepted once per physical key-down: a second press while the
/// key is still held (terminal or kernel auto-repeat) is ignored.
#[derive(Debug, Clone, Default)]
pub struct KeyState {
    pressed: [bool; KEY_COUNT],
    /// Held keys in press order, most recent last
    held: Vec<KeyId>,
    /// Sequence number of each key's latest press, 0 = never pressed
    last_press: [u64; KEY_COUNT],
    presses: u64,
}

impl KeyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` pressed. Returns false if it already was.
    pub fn press(&mut self, key: KeyId) -> bool {
        if self.pressed[key.index()] {
            return false;
        }
        self.pressed[key.index()] = true;
        self.held.push(key);
        self.presses += 1;
        self.last_press[key.index()] = self.presses;
        true
    }

    /// Mark `key` released. Returns false if it was not held.
    pub fn release(&mut self, key: KeyId) -> bool {
        if !self.pressed[key.index()] {
            return false;
        }
        self.pressed[key.index()] = false;
        self.held.retain(|&k| k != key);
        true
    }

    pub fn is_pressed(&self, key: KeyId) -> bool {
        self.pressed[key.index()]
    }

    /// Ordering of the latest press of `key`; later presses compare greater.
    /// Kept after release. `None` if the key was never pressed.
    pub fn last_press(&self, key: KeyId) -> Option<u64> {
        match self.last_press[key.index()] {
            0 => None,
            seq => Some(seq),
        }
    }

    /// Most recently pressed channel key that is still held
    pub fn latest_channel_key(&self) -> Option<KeyId> {
        self.held.iter().rev().copied().find(|k| !k.is_arm())
    }

    pub fn any_channel_pressed(&self) -> bool {
        KeyId::all().any(|k| !k.is_arm() && self.is_pressed(k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(d: u8) -> KeyId {
        KeyId::new(d).unwrap()
    }

    #[test]
    fn test_key_range() {
        assert!(KeyId::new(7).is_some());
        assert!(KeyId::new(8).is_none());
        assert!(KeyId::try_from(9u8).is_err());
        assert!(key(0).is_arm());
        assert_eq!(KeyId::all().count(), KEY_COUNT);
    }

    #[test]
    fn test_repeated_press_is_debounced() {
        let mut keys = KeyState::new();
        assert!(keys.press(key(3)));
        assert!(!keys.press(key(3)));
        assert!(keys.is_pressed(key(3)));
        assert!(keys.release(key(3)));
        assert!(!keys.release(key(3)));
        assert!(!keys.is_pressed(key(3)));
    }

    #[test]
    fn test_last_press_order_survives_release() {
        let mut keys = KeyState::new();
        assert_eq!(keys.last_press(key(1)), None);
        keys.press(key(1));
        keys.press(key(2));
        keys.release(key(2));
        assert!(keys.last_press(key(2)) > keys.last_press(key(1)));
        // Repeat of a held key is not a new press
        let first = keys.last_press(key(1));
        keys.press(key(1));
        assert_eq!(keys.last_press(key(1)), first);
    }

    #[test]
    fn test_latest_channel_key_skips_arm_and_released() {
        let mut keys = KeyState::new();
        keys.press(key(2));
        keys.press(key(5));
        keys.press(key(0));
        assert_eq!(keys.latest_channel_key(), Some(key(5)));
        keys.release(key(5));
        assert_eq!(keys.latest_channel_key(), Some(key(2)));
        keys.release(key(2));
        assert_eq!(keys.latest_channel_key(), None);
        assert!(!keys.any_channel_pressed());
    }
}
