//! Scripted input for replays and tests
//!
//! One step per line:
//!
//! ```text
//! # arm, then fire the vibration channel for half a second
//! tap 0
//! press 4
//! wait 500
//! release 4
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;

use super::{normalize_name, InputError, InputSource, KeyEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Event(KeyEvent),
    Wait(Duration),
}

/// Plays back a fixed list of events, sleeping between them as scripted
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    steps: VecDeque<Step>,
}

impl ScriptedInput {
    /// Events delivered back to back with no delay
    pub fn from_events(events: impl IntoIterator<Item = KeyEvent>) -> Self {
        Self {
            steps: events.into_iter().map(Step::Event).collect(),
        }
    }

    pub fn parse(script: &str) -> Result<Self, InputError> {
        let mut steps = VecDeque::new();
        for (i, raw) in script.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let err = |message: String| InputError::Script {
                line: i + 1,
                message,
            };

            let mut parts = line.split_whitespace();
            let verb = parts.next().unwrap_or("");
            let arg = parts
                .next()
                .ok_or_else(|| err(format!("'{verb}' needs an argument")))?;
            if parts.next().is_some() {
                return Err(err("too many arguments".into()));
            }

            if verb == "wait" {
                let ms: u64 = arg
                    .parse()
                    .map_err(|_| err(format!("invalid delay '{arg}'")))?;
                steps.push_back(Step::Wait(Duration::from_millis(ms)));
                continue;
            }

            let key = normalize_name(arg).ok_or_else(|| err(format!("unknown key '{arg}'")))?;
            match verb {
                "press" => steps.push_back(Step::Event(KeyEvent::press(key))),
                "release" => steps.push_back(Step::Event(KeyEvent::release(key))),
                "tap" => {
                    steps.push_back(Step::Event(KeyEvent::press(key)));
                    steps.push_back(Step::Event(KeyEvent::release(key)));
                }
                other => return Err(err(format!("unknown step '{other}'"))),
            }
        }
        Ok(Self { steps })
    }

    /// Remaining events, ignoring waits
    pub fn len(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::Event(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl InputSource for ScriptedInput {
    async fn next_event(&mut self) -> Option<KeyEvent> {
        while let Some(step) = self.steps.pop_front() {
            match step {
                Step::Event(event) => return Some(event),
                Step::Wait(delay) => tokio::time::sleep(delay).await,
            }
        }
        None
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Key, KeyAction};

    #[test]
    fn test_parse_script() {
        let script = ScriptedInput::parse(
            "# comment\n\ntap 0\npress kp4   # keypad folds\nwait 120\nrelease 4\npress Esc\n",
        )
        .unwrap();
        assert_eq!(script.len(), 5);
    }

    #[test]
    fn test_parse_errors_carry_line_numbers() {
        let err = ScriptedInput::parse("press 1\nhold 2\n").unwrap_err();
        assert!(matches!(err, InputError::Script { line: 2, .. }));

        let err = ScriptedInput::parse("press 9").unwrap_err();
        assert!(matches!(err, InputError::Script { line: 1, .. }));

        let err = ScriptedInput::parse("wait soon").unwrap_err();
        assert!(matches!(err, InputError::Script { line: 1, .. }));

        let err = ScriptedInput::parse("press").unwrap_err();
        assert!(matches!(err, InputError::Script { line: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_order_and_waits() {
        let mut script = ScriptedInput::parse("press 1\nwait 200\nrelease 1\n").unwrap();
        let start = tokio::time::Instant::now();

        let first = script.next_event().await.unwrap();
        assert_eq!(Some(first), KeyEvent::digit(1, KeyAction::Press));

        let second = script.next_event().await.unwrap();
        assert_eq!(Some(second), KeyEvent::digit(1, KeyAction::Release));
        assert!(start.elapsed() >= Duration::from_millis(200));

        assert_eq!(script.next_event().await, None);
    }

    #[tokio::test]
    async fn test_from_events() {
        let mut script = ScriptedInput::from_events([KeyEvent::press(Key::Quit)]);
        assert_eq!(script.next_event().await, Some(KeyEvent::press(Key::Quit)));
        assert!(script.is_empty());
    }
}
