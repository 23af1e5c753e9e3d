//! Keyboard-driven 8-channel PPM controller
//!
//! Digit keys drive servo/RC pulse-width channels. A background generator
//! recomputes all eight channels at a fixed rate and streams only the
//! changes to a PPM encoder over serial as `v0,...,v7\n` lines. Channels
//! flagged as protected only respond after the arm gesture: tap `0`, then
//! press the channel's key.

pub mod arming;
pub mod config;
pub mod frame;
pub mod generator;
pub mod input;
pub mod keys;
pub mod policy;
pub mod scheduler;
pub mod state;
pub mod transmit;
pub mod tui;

pub use arming::{ArmOutcome, ArmPhase, ArmingState};
pub use config::{ChannelConfig, ConfigError, ControllerConfig, FailurePolicy, PulseRange};
pub use frame::{ChannelFrame, CHANNEL_COUNT, NEUTRAL_US};
pub use generator::ChannelGenerator;
pub use input::{InputError, InputSource, Key, KeyAction, KeyEvent, ScriptedInput};
pub use keys::{KeyId, KeyState, KEY_COUNT};
pub use policy::{ChannelPolicy, Level, PulseTimer, Side};
pub use scheduler::{run_generator, run_input, GeneratorStats, InputEnd, Shutdown};
pub use state::{ControlEvent, Gesture, SharedState, Snapshot};
pub use transmit::{ChangeGate, TransmitOutcome};
