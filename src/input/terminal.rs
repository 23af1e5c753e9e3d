//! Focused-terminal input via crossterm
//!
//! Terminals that speak the kitty keyboard protocol report real key-up
//! events. Everywhere else only presses (and auto-repeats) arrive, so a key
//! is considered released once its repeats stop coming.

use std::collections::HashMap;
use std::io::stdout;
use std::time::Duration;

use async_trait::async_trait;
use crossterm::event::{
    Event, EventStream, KeyCode, KeyEvent as TermKeyEvent, KeyEventKind, KeyModifiers,
    KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement};
use futures::StreamExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{normalize_char, InputError, InputSource, Key, KeyAction, KeyEvent};

/// Time after the first press before a silent key counts as released;
/// covers the usual auto-repeat delay
const FIRST_HOLD: Duration = Duration::from_millis(700);
/// Time after an auto-repeat before a silent key counts as released
const REPEAT_HOLD: Duration = Duration::from_millis(150);

/// Turns press-only reports into press/release pairs
///
/// The first press of a key passes through and opens a hold window; repeats
/// inside the window are swallowed and extend it. A key whose window runs out
/// is released by `expire`.
#[derive(Debug, Default)]
struct ReleaseInference {
    held: HashMap<Key, Instant>,
}

impl ReleaseInference {
    fn accept(&mut self, event: KeyEvent, now: Instant) -> Option<KeyEvent> {
        if event.key == Key::Quit {
            return Some(event);
        }
        match event.action {
            KeyAction::Press => match self.held.insert(event.key, now + REPEAT_HOLD) {
                Some(_) => None,
                None => {
                    self.held.insert(event.key, now + FIRST_HOLD);
                    Some(event)
                }
            },
            KeyAction::Release => {
                self.held.remove(&event.key);
                Some(event)
            }
        }
    }

    /// When the earliest held key times out
    fn next_deadline(&self) -> Option<Instant> {
        self.held.values().min().copied()
    }

    /// Release the earliest key whose window closed at or before `now`
    fn expire(&mut self, now: Instant) -> Option<KeyEvent> {
        let (key, _) = self
            .held
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .min_by_key(|(_, deadline)| **deadline)
            .map(|(key, deadline)| (*key, *deadline))?;
        self.held.remove(&key);
        Some(KeyEvent::release(key))
    }
}

/// Keyboard input from the terminal this process runs in
pub struct TerminalInput {
    events: EventStream,
    /// `None` when the terminal reports key-ups itself
    inference: Option<ReleaseInference>,
}

impl TerminalInput {
    /// Put the terminal in raw mode and request key-up reporting
    pub fn new() -> Result<Self, InputError> {
        enable_raw_mode()?;
        let enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
        if enhanced {
            execute!(
                stdout(),
                PushKeyboardEnhancementFlags(
                    KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                        | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
                )
            )?;
            info!("Terminal reports key releases");
        } else {
            info!("Terminal cannot report key releases, inferring them from auto-repeat");
        }
        Ok(Self {
            events: EventStream::new(),
            inference: (!enhanced).then(ReleaseInference::default),
        })
    }
}

impl Drop for TerminalInput {
    fn drop(&mut self) {
        if self.inference.is_none() {
            let _ = execute!(stdout(), PopKeyboardEnhancementFlags);
        }
        let _ = disable_raw_mode();
    }
}

/// Normalize a crossterm key event
fn translate(event: &TermKeyEvent) -> Option<KeyEvent> {
    let key = match event.code {
        KeyCode::Esc => Key::Quit,
        // Raw mode swallows SIGINT
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => Key::Quit,
        KeyCode::Char(c) => normalize_char(c)?,
        _ => return None,
    };
    let action = match event.kind {
        KeyEventKind::Press | KeyEventKind::Repeat => KeyAction::Press,
        KeyEventKind::Release => KeyAction::Release,
    };
    Some(KeyEvent { key, action })
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[async_trait]
impl InputSource for TerminalInput {
    async fn next_event(&mut self) -> Option<KeyEvent> {
        loop {
            let deadline = self.inference.as_ref().and_then(ReleaseInference::next_deadline);
            tokio::select! {
                event = self.events.next() => match event {
                    Some(Ok(Event::Key(key))) => {
                        let Some(event) = translate(&key) else {
                            debug!("Ignoring {:?}", key.code);
                            continue;
                        };
                        let event = match &mut self.inference {
                            Some(inference) => inference.accept(event, Instant::now()),
                            None => Some(event),
                        };
                        if event.is_some() {
                            return event;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Terminal input error: {}", e);
                        return None;
                    }
                    None => return None,
                },
                _ = sleep_until(deadline) => {
                    let now = Instant::now();
                    if let Some(event) = self.inference.as_mut().and_then(|i| i.expire(now)) {
                        return Some(event);
                    }
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "terminal"
    }
}
