//! Per-channel output policies
//!
//! Each of the 8 output channels is driven by exactly one `ChannelPolicy`.
//! Policies are pure functions of key state, arm state and time; the only
//! state they carry between ticks is the `PulseTimer` of an oscillating
//! channel.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::arming::ArmingState;
use crate::keys::{KeyId, KeyState};

/// One side of a multi-level channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub key: KeyId,
    pub us: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Which level wins when both keys of a multi-level channel are active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    #[default]
    Right,
}

/// How a channel turns key/arm state into a pulse width
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ChannelPolicy {
    /// `active_us` while the key is held
    Plain { key: KeyId, active_us: u16 },
    /// `active_us` while the key is held and authorized
    Gated { key: KeyId, active_us: u16 },
    /// Alternates `high_us` / neutral every `interval_ms` while held and
    /// authorized, starting high
    Oscillating {
        key: KeyId,
        high_us: u16,
        interval_ms: u64,
    },
    /// Two gated keys selecting distinct levels; `idle_us` when neither is
    /// active
    MultiLevel {
        left: Level,
        right: Level,
        idle_us: u16,
        #[serde(default)]
        precedence: Side,
    },
    /// Several ungated keys, each selecting its own level. The most recently
    /// pressed key decides; once it is released the channel idles, even if
    /// an earlier key is still held.
    Selector { levels: Vec<Level>, idle_us: u16 },
    /// Always neutral
    Pinned,
}

/// The inputs a policy may look at
pub trait KeyInputs {
    fn pressed(&self, key: KeyId) -> bool;

    /// Held and authorized by the arm gesture
    fn authorized(&self, key: KeyId) -> bool;

    /// Ordering of the key's latest press (held or not); later is greater
    fn last_press(&self, key: KeyId) -> Option<u64>;
}

/// Live key and arm state, borrowed for one tick
#[derive(Debug, Clone, Copy)]
pub struct KeyView<'a> {
    pub keys: &'a KeyState,
    pub arming: &'a ArmingState,
}

impl KeyInputs for KeyView<'_> {
    fn pressed(&self, key: KeyId) -> bool {
        self.keys.is_pressed(key)
    }

    fn authorized(&self, key: KeyId) -> bool {
        self.keys.is_pressed(key) && self.arming.is_authorized(key)
    }

    fn last_press(&self, key: KeyId) -> Option<u64> {
        self.keys.last_press(key)
    }
}

impl ChannelPolicy {
    /// Keys this policy reads, with the label shown when each is pressed
    pub fn keys(&self) -> Vec<(KeyId, Option<&str>)> {
        match self {
            ChannelPolicy::Plain { key, .. }
            | ChannelPolicy::Gated { key, .. }
            | ChannelPolicy::Oscillating { key, .. } => vec![(*key, None)],
            ChannelPolicy::MultiLevel { left, right, .. } => vec![
                (left.key, left.label.as_deref()),
                (right.key, right.label.as_deref()),
            ],
            ChannelPolicy::Selector { levels, .. } => levels
                .iter()
                .map(|l| (l.key, l.label.as_deref()))
                .collect(),
            ChannelPolicy::Pinned => Vec::new(),
        }
    }

    /// Whether the keys of this policy need the arm gesture
    pub fn is_gated(&self) -> bool {
        matches!(
            self,
            ChannelPolicy::Gated { .. }
                | ChannelPolicy::Oscillating { .. }
                | ChannelPolicy::MultiLevel { .. }
        )
    }

    /// Every pulse width this policy can output besides neutral
    pub fn output_values(&self) -> Vec<u16> {
        match self {
            ChannelPolicy::Plain { active_us, .. } | ChannelPolicy::Gated { active_us, .. } => {
                vec![*active_us]
            }
            ChannelPolicy::Oscillating { high_us, .. } => vec![*high_us],
            ChannelPolicy::MultiLevel {
                left,
                right,
                idle_us,
                ..
            } => vec![left.us, right.us, *idle_us],
            ChannelPolicy::Selector { levels, idle_us } => levels
                .iter()
                .map(|l| l.us)
                .chain([*idle_us])
                .collect(),
            ChannelPolicy::Pinned => Vec::new(),
        }
    }

    /// Short name for display
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelPolicy::Plain { .. } => "plain",
            ChannelPolicy::Gated { .. } => "gated",
            ChannelPolicy::Oscillating { .. } => "pulse",
            ChannelPolicy::MultiLevel { .. } => "multi",
            ChannelPolicy::Selector { .. } => "select",
            ChannelPolicy::Pinned => "fixed",
        }
    }

    /// Compute this tick's pulse width
    pub fn evaluate(
        &self,
        view: &impl KeyInputs,
        timer: &mut PulseTimer,
        now: Instant,
        neutral: u16,
    ) -> u16 {
        match self {
            ChannelPolicy::Plain { key, active_us } => {
                if view.pressed(*key) {
                    *active_us
                } else {
                    neutral
                }
            }
            ChannelPolicy::Gated { key, active_us } => {
                if view.authorized(*key) {
                    *active_us
                } else {
                    neutral
                }
            }
            ChannelPolicy::Oscillating {
                key,
                high_us,
                interval_ms,
            } => {
                let interval = Duration::from_millis(*interval_ms);
                if timer.advance(view.authorized(*key), now, interval) {
                    *high_us
                } else {
                    neutral
                }
            }
            ChannelPolicy::MultiLevel {
                left,
                right,
                idle_us,
                precedence,
            } => match (view.authorized(left.key), view.authorized(right.key)) {
                (true, true) => match precedence {
                    Side::Left => left.us,
                    Side::Right => right.us,
                },
                (true, false) => left.us,
                (false, true) => right.us,
                (false, false) => *idle_us,
            },
            ChannelPolicy::Selector { levels, idle_us } => levels
                .iter()
                .filter_map(|l| view.last_press(l.key).map(|seq| (seq, l)))
                .max_by_key(|(seq, _)| *seq)
                .filter(|(_, l)| view.pressed(l.key))
                .map_or(*idle_us, |(_, l)| l.us),
            ChannelPolicy::Pinned => neutral,
        }
    }
}

/// Phase clock of an oscillating channel
///
/// The clock starts at the activation instant and advances in whole
/// intervals, so the high/neutral pattern depends only on elapsed time and
/// not on when ticks happen to land.
#[derive(Debug, Clone, Default)]
pub struct PulseTimer {
    last_toggle: Option<Instant>,
    phase: bool,
}

impl PulseTimer {
    /// Update for this tick and return the phase (true = high)
    pub fn advance(&mut self, active: bool, now: Instant, interval: Duration) -> bool {
        if !active {
            self.last_toggle = None;
            self.phase = false;
            return false;
        }

        let Some(last) = self.last_toggle else {
            self.last_toggle = Some(now);
            self.phase = true;
            return true;
        };

        if interval.is_zero() {
            return self.phase;
        }

        let elapsed = now.saturating_duration_since(last).as_nanos();
        let steps = elapsed / interval.as_nanos();
        if steps > 0 {
            if steps % 2 == 1 {
                self.phase = !self.phase;
            }
            let advance = interval.as_nanos() * steps;
            self.last_toggle = Some(last + Duration::from_nanos(advance as u64));
        }
        self.phase
    }

    pub fn phase(&self) -> bool {
        self.phase
    }
}
