//! Shared controller state
//!
//! Key state, arm state, the generator (with its pulse timers), the current
//! frame and the last-sent snapshot live behind one lock. Input tasks, the
//! generator task and the display all go through `SharedState`; nothing else
//! holds a reference into the core.

use std::time::Instant;

use keyppm_link::ChannelTransmitter;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::info;

use crate::arming::{ArmOutcome, ArmingState};
use crate::config::{ConfigError, ControllerConfig};
use crate::frame::ChannelFrame;
use crate::generator::ChannelGenerator;
use crate::input::{Key, KeyAction, KeyEvent};
use crate::keys::{KeyId, KeyState};
use crate::transmit::{self, ChangeGate, PendingSend, TransmitOutcome};

/// Notifications for display and logging consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// `0` was tapped; the next protected press will be authorized
    Armed,
    Authorized(KeyId),
    /// A protected key was pressed without arming first
    Denied(KeyId),
    /// A line went out on the link (without newline)
    Sent(String),
    SendFailed(String),
    Quit,
}

/// What the status text should say right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gesture {
    /// Nothing held; `hint` lists the configured keys
    Waiting { hint: String },
    Armed,
    Channel {
        key: KeyId,
        label: Option<String>,
        /// `None` for keys that need no arming
        authorized: Option<bool>,
    },
}

impl Gesture {
    pub fn title(&self) -> String {
        match self {
            Gesture::Waiting { .. } => "Waiting".to_string(),
            Gesture::Armed => "Armed".to_string(),
            Gesture::Channel { key, label, .. } => {
                label.clone().unwrap_or_else(|| format!("Gesture {key}"))
            }
        }
    }

    pub fn subtitle(&self) -> String {
        match self {
            Gesture::Waiting { hint } => hint.clone(),
            Gesture::Armed => "0 tapped · Choose a protected key".to_string(),
            Gesture::Channel {
                key,
                label,
                authorized: Some(true),
            } => match label {
                Some(label) => format!("Gesture {key} · {label}"),
                None => format!("Gesture {key}"),
            },
            Gesture::Channel {
                key,
                authorized: Some(false),
                ..
            } => format!("Gesture {key} · Need 0 → {key} to execute"),
            Gesture::Channel {
                authorized: None, ..
            } => "Detected gesture".to_string(),
        }
    }
}

/// Consistent copy of everything the display needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub channels: ChannelFrame,
    pub last_sent: ChannelFrame,
    pub gesture: Gesture,
    pub armed: bool,
    pub authorized: Option<KeyId>,
}

#[derive(Debug)]
struct Core {
    keys: KeyState,
    arming: ArmingState,
    generator: ChannelGenerator,
    channels: ChannelFrame,
    gate: ChangeGate,
}

/// The single lock-protected controller state
#[derive(Debug)]
pub struct SharedState {
    core: Mutex<Core>,
    labels: Vec<(KeyId, String)>,
    waiting_hint: String,
    events: broadcast::Sender<ControlEvent>,
}

impl SharedState {
    /// Validate `config` and build the state from it
    pub fn new(config: &ControllerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let neutral = ChannelFrame::neutral(config.neutral_us);
        let (events, _) = broadcast::channel(64);
        Ok(Self {
            core: Mutex::new(Core {
                keys: KeyState::new(),
                arming: ArmingState::new(config.protected_keys()),
                generator: ChannelGenerator::new(config.channel_policies()?, config.neutral_us),
                channels: neutral,
                gate: ChangeGate::new(neutral, config.on_failure),
            }),
            labels: config.key_labels(),
            waiting_hint: config.waiting_hint(),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControlEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ControlEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Apply one normalized input event. Returns false when quit was requested.
    pub fn handle_event(&self, event: KeyEvent) -> bool {
        let key = match event.key {
            Key::Quit => {
                if event.action == KeyAction::Press {
                    info!("Quit requested");
                    self.emit(ControlEvent::Quit);
                    return false;
                }
                return true;
            }
            Key::Digit(key) => key,
        };

        let outcome = {
            let mut core = self.core.lock();
            match event.action {
                KeyAction::Press => {
                    if !core.keys.press(key) {
                        return true;
                    }
                    core.arming.on_press(key)
                }
                KeyAction::Release => {
                    if core.keys.release(key) {
                        core.arming.on_release(key);
                    }
                    return true;
                }
            }
        };

        match outcome {
            ArmOutcome::Armed => {
                info!("Activation tapped: waiting for a protected key");
                self.emit(ControlEvent::Armed);
            }
            ArmOutcome::Authorized(k) => {
                info!("Gesture {} authorized", k);
                self.emit(ControlEvent::Authorized(k));
            }
            ArmOutcome::Denied(k) => {
                info!("Gesture {}: need 0 → {} to execute", k, k);
                self.emit(ControlEvent::Denied(k));
            }
            ArmOutcome::Unaffected => info!("Gesture detected: {}", key),
        }
        true
    }

    /// Recompute the frame for `now` and stage it if it changed
    pub fn tick(&self, now: Instant) -> Option<PendingSend> {
        let mut core = self.core.lock();
        let Core {
            keys,
            arming,
            generator,
            channels,
            gate,
        } = &mut *core;
        *channels = generator.compute(keys, arming, now);
        gate.stage(channels)
    }

    /// Record the result of a staged send
    pub fn complete(&self, pending: &PendingSend, ok: bool) {
        self.core.lock().gate.complete(pending, ok);
    }

    /// One generator cycle: compute under the lock, write outside it
    pub fn step<T: ChannelTransmitter + ?Sized>(&self, now: Instant, tx: &mut T) -> TransmitOutcome {
        let Some(pending) = self.tick(now) else {
            return TransmitOutcome::Unchanged;
        };
        let outcome = transmit::send(tx, &pending);
        match &outcome {
            TransmitOutcome::Sent(line) => {
                self.complete(&pending, true);
                self.emit(ControlEvent::Sent(line.clone()));
            }
            TransmitOutcome::Failed(_, e) => {
                self.complete(&pending, false);
                self.emit(ControlEvent::SendFailed(e.to_string()));
            }
            TransmitOutcome::Unchanged => {}
        }
        outcome
    }

    pub fn channels(&self) -> ChannelFrame {
        self.core.lock().channels
    }

    pub fn snapshot(&self) -> Snapshot {
        let core = self.core.lock();
        Snapshot {
            channels: core.channels,
            last_sent: *core.gate.last_sent(),
            gesture: self.gesture_locked(&core),
            armed: core.arming.is_armed(),
            authorized: core.arming.authorized_key(),
        }
    }

    pub fn gesture(&self) -> Gesture {
        let core = self.core.lock();
        self.gesture_locked(&core)
    }

    fn gesture_locked(&self, core: &Core) -> Gesture {
        match core.keys.latest_channel_key() {
            Some(key) => Gesture::Channel {
                key,
                label: self
                    .labels
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, l)| l.clone()),
                authorized: core
                    .arming
                    .is_protected(key)
                    .then(|| core.arming.is_authorized(key)),
            },
            None if core.arming.is_armed() => Gesture::Armed,
            None => Gesture::Waiting {
                hint: self.waiting_hint.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyppm_link::MemoryTransmitter;

    fn press(d: u8) -> KeyEvent {
        KeyEvent::digit(d, KeyAction::Press).unwrap()
    }

    fn release(d: u8) -> KeyEvent {
        KeyEvent::digit(d, KeyAction::Release).unwrap()
    }

    fn key(d: u8) -> KeyId {
        KeyId::new(d).unwrap()
    }

    fn state() -> SharedState {
        SharedState::new(&ControllerConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_short_channel_list() {
        let mut config = ControllerConfig::default();
        config.channels.pop();
        assert!(matches!(
            SharedState::new(&config),
            Err(ConfigError::ChannelCount(7))
        ));
    }

    #[test]
    fn test_waiting_hint_follows_config() {
        let mut config = ControllerConfig::default();
        config.channels[4].policy = crate::policy::ChannelPolicy::Pinned;
        config.channels[5].policy = crate::policy::ChannelPolicy::Pinned;
        let state = SharedState::new(&config).unwrap();
        assert_eq!(
            state.gesture().subtitle(),
            "Press 1–3,7  ·  0 then 4 for actions"
        );
    }

    #[test]
    fn test_quit_press_stops() {
        let state = state();
        let mut rx = state.subscribe();
        assert!(!state.handle_event(KeyEvent::press(Key::Quit)));
        assert!(state.handle_event(KeyEvent::release(Key::Quit)));
        assert_eq!(rx.try_recv().unwrap(), ControlEvent::Quit);
    }

    #[test]
    fn test_arm_events_broadcast() {
        let state = state();
        let mut rx = state.subscribe();
        state.handle_event(press(0));
        state.handle_event(press(4));
        state.handle_event(press(5));
        assert_eq!(rx.try_recv().unwrap(), ControlEvent::Armed);
        assert_eq!(rx.try_recv().unwrap(), ControlEvent::Authorized(key(4)));
        assert_eq!(rx.try_recv().unwrap(), ControlEvent::Denied(key(5)));
    }

    #[test]
    fn test_auto_repeat_does_not_consume_arm() {
        let state = state();
        state.handle_event(press(4));
        state.handle_event(press(0));
        // Repeat of the still-held 4 is not a new press
        state.handle_event(press(4));
        let snap = state.snapshot();
        assert!(snap.armed);
        assert_eq!(snap.authorized, None);
    }

    #[test]
    fn test_gesture_labels() {
        let state = state();
        assert_eq!(
            state.gesture(),
            Gesture::Waiting {
                hint: "Press 1–3,7  ·  0 then 4/5/6 for actions".to_string()
            }
        );

        state.handle_event(press(0));
        state.handle_event(release(0));
        assert_eq!(state.gesture(), Gesture::Armed);
        assert_eq!(state.gesture().title(), "Armed");

        state.handle_event(press(4));
        let gesture = state.gesture();
        assert_eq!(gesture.title(), "Vibration");
        assert_eq!(gesture.subtitle(), "Gesture 4 · Vibration");
        state.handle_event(release(4));

        state.handle_event(press(5));
        assert_eq!(
            state.gesture().subtitle(),
            "Gesture 5 · Need 0 → 5 to execute"
        );
        state.handle_event(release(5));

        state.handle_event(press(2));
        let gesture = state.gesture();
        assert_eq!(gesture.title(), "Gesture 2");
        assert_eq!(gesture.subtitle(), "Detected gesture");
    }

    #[test]
    fn test_step_sends_once_per_change() {
        let state = state();
        let mut tx = MemoryTransmitter::new();
        let sent = tx.handle();
        let mut rx = state.subscribe();
        let now = Instant::now();

        assert!(matches!(state.step(now, &mut tx), TransmitOutcome::Unchanged));
        state.handle_event(press(1));
        assert!(matches!(state.step(now, &mut tx), TransmitOutcome::Sent(_)));
        assert!(matches!(state.step(now, &mut tx), TransmitOutcome::Unchanged));

        assert_eq!(
            sent.lines(),
            vec!["2000,1500,1500,1500,1500,1500,1500,1500".to_string()]
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ControlEvent::Sent("2000,1500,1500,1500,1500,1500,1500,1500".to_string())
        );
        assert_eq!(state.snapshot().last_sent, state.channels());
    }

    #[test]
    fn test_step_failure_reported() {
        let state = state();
        let mut tx = MemoryTransmitter::new();
        tx.handle().fail_next(1);
        let mut rx = state.subscribe();

        state.handle_event(press(2));
        assert!(matches!(
            state.step(Instant::now(), &mut tx),
            TransmitOutcome::Failed(..)
        ));
        assert!(matches!(rx.try_recv().unwrap(), ControlEvent::SendFailed(_)));
        // Drop policy: the failed frame counts as sent
        assert_eq!(state.snapshot().last_sent, state.channels());
    }
}
