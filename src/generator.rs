//! Periodic channel generator
//!
//! Every tick the whole frame is recomputed from key state, arm state and the
//! clock. Nothing is patched incrementally, so output can never drift from
//! the inputs whatever order events arrive in.

use std::time::Instant;

use crate::arming::ArmingState;
use crate::frame::{ChannelFrame, CHANNEL_COUNT};
use crate::keys::KeyState;
use crate::policy::{ChannelPolicy, KeyView, PulseTimer};

#[derive(Debug, Clone)]
pub struct ChannelGenerator {
    policies: [ChannelPolicy; CHANNEL_COUNT],
    timers: [PulseTimer; CHANNEL_COUNT],
    neutral: u16,
}

impl ChannelGenerator {
    /// One policy per channel, see `ControllerConfig::channel_policies`
    pub fn new(policies: [ChannelPolicy; CHANNEL_COUNT], neutral: u16) -> Self {
        Self {
            policies,
            timers: Default::default(),
            neutral,
        }
    }

    /// Recompute every channel for `now`
    pub fn compute(&mut self, keys: &KeyState, arming: &ArmingState, now: Instant) -> ChannelFrame {
        let view = KeyView { keys, arming };
        let mut frame = ChannelFrame::neutral(self.neutral);
        for (i, (policy, timer)) in self.policies.iter().zip(self.timers.iter_mut()).enumerate() {
            frame.set(i, policy.evaluate(&view, timer, now, self.neutral));
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::keys::KeyId;
    use std::time::Duration;

    struct Rig {
        generator: ChannelGenerator,
        keys: KeyState,
        arming: ArmingState,
    }

    impl Rig {
        fn new() -> Self {
            let config = ControllerConfig::default();
            Self {
                generator: ChannelGenerator::new(
                    config.channel_policies().unwrap(),
                    config.neutral_us,
                ),
                keys: KeyState::new(),
                arming: ArmingState::new(config.protected_keys()),
            }
        }

        fn press(&mut self, d: u8) {
            let k = KeyId::new(d).unwrap();
            if self.keys.press(k) {
                self.arming.on_press(k);
            }
        }

        fn release(&mut self, d: u8) {
            let k = KeyId::new(d).unwrap();
            if self.keys.release(k) {
                self.arming.on_release(k);
            }
        }

        fn frame(&mut self, now: Instant) -> ChannelFrame {
            self.generator.compute(&self.keys, &self.arming, now)
        }
    }

    #[test]
    fn test_all_released_is_neutral() {
        let mut rig = Rig::new();
        assert_eq!(rig.frame(Instant::now()), ChannelFrame::neutral(1500));
    }

    #[test]
    fn test_plain_channels_track_keys() {
        let mut rig = Rig::new();
        rig.press(1);
        rig.press(7);
        let frame = rig.frame(Instant::now());
        assert_eq!(frame.values(), &[2000, 1500, 1500, 1500, 1500, 1500, 2000, 1500]);
    }

    #[test]
    fn test_unarmed_protected_keys_stay_neutral() {
        let mut rig = Rig::new();
        rig.press(4);
        rig.press(5);
        rig.press(6);
        assert_eq!(rig.frame(Instant::now()), ChannelFrame::neutral(1500));
    }

    #[test]
    fn test_armed_drop_right_drives_two_channels() {
        let mut rig = Rig::new();
        rig.press(0);
        rig.press(6);
        let frame = rig.frame(Instant::now());
        assert_eq!(frame[4], 2000);
        assert_eq!(frame[5], 2000);
        rig.release(6);
        assert_eq!(rig.frame(Instant::now()), ChannelFrame::neutral(1500));
    }

    #[test]
    fn test_pinned_channel_under_every_key() {
        let mut rig = Rig::new();
        rig.press(0);
        for d in 1..=7 {
            rig.press(d);
        }
        assert_eq!(rig.frame(Instant::now())[7], 1500);
    }

    #[test]
    fn test_compute_is_idempotent() {
        let mut rig = Rig::new();
        rig.press(0);
        rig.press(4);
        rig.press(2);
        let now = Instant::now();
        let first = rig.frame(now);
        let second = rig.frame(now);
        assert_eq!(first, second);
    }

    #[test]
    fn test_vibration_pulses_while_authorized() {
        let mut rig = Rig::new();
        let start = Instant::now();
        rig.press(0);
        rig.press(4);
        let ms = |n| start + Duration::from_millis(n);

        assert_eq!(rig.frame(start)[3], 1700);
        assert_eq!(rig.frame(ms(60))[3], 1700);
        assert_eq!(rig.frame(ms(100))[3], 1500);
        assert_eq!(rig.frame(ms(200))[3], 1700);
        rig.release(4);
        assert_eq!(rig.frame(ms(220))[3], 1500);
    }
}
