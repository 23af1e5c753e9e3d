//! Terminal display
//!
//! Draws the gesture text, one bar per channel and the link status. The
//! display only reads snapshots and control events; key input is handled by
//! the input sources.

pub mod app;
pub mod render;

pub use app::{App, LinkStatus};

use std::io::{stdout, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::cursor::{Hide, Show};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::scheduler::Shutdown;
use crate::state::SharedState;

/// Redraw every `refresh` until shutdown
///
/// The terminal stays in raw mode for the whole run so keys typed while a
/// global input source is active do not echo over the display. Raw mode is
/// shared with the terminal input source; enabling it twice is harmless.
pub async fn run(
    state: Arc<SharedState>,
    mut app: App,
    refresh: Duration,
    shutdown: Shutdown,
) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(Hide)?;

    let result = draw_loop(&state, &mut app, refresh, &shutdown).await;

    stdout().execute(Show)?;
    stdout().execute(LeaveAlternateScreen)?;
    disable_raw_mode()?;
    result
}

async fn draw_loop(
    state: &SharedState,
    app: &mut App,
    refresh: Duration,
    shutdown: &Shutdown,
) -> Result<()> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut events = state.subscribe();
    let mut ticker = tokio::time::interval(refresh);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            event = events.recv() => match event {
                Ok(event) => app.handle_control_event(event),
                Err(RecvError::Lagged(n)) => debug!("Display skipped {} events", n),
                Err(RecvError::Closed) => break,
            },
            _ = ticker.tick() => {
                app.update(state.snapshot());
                if app.take_bell() {
                    let backend = terminal.backend_mut();
                    Write::write_all(backend, b"\x07")?;
                    Write::flush(backend)?;
                }
                terminal.draw(|f| render::render(f, app))?;
            }
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}
