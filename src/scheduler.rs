//! Periodic generator task, input pump and shutdown signal

use std::sync::Arc;
use std::time::Duration;

use keyppm_link::ChannelTransmitter;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::input::InputSource;
use crate::state::SharedState;
use crate::transmit::TransmitOutcome;

/// Cooperative stop flag shared by every loop
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Idempotent
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `trigger` has been called
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

/// Counters from one generator run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorStats {
    pub ticks: u64,
    pub sent: u64,
    pub failed: u64,
}

/// Run blocking link I/O without starving the other tasks on this worker
///
/// A current-thread runtime has no spare worker to hand off to, so there the
/// call simply runs inline.
fn blocking_io<R>(f: impl FnOnce() -> R) -> R {
    match Handle::current().runtime_flavor() {
        RuntimeFlavor::MultiThread => tokio::task::block_in_place(f),
        _ => f(),
    }
}

/// Recompute and transmit every `tick` until shutdown, then close the link
///
/// Missed ticks are skipped rather than bunched up. After the loop stops,
/// `grace` elapses before the transmitter is closed.
pub async fn run_generator<T: ChannelTransmitter>(
    state: Arc<SharedState>,
    mut tx: T,
    tick: Duration,
    grace: Duration,
    shutdown: Shutdown,
) -> GeneratorStats {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stats = GeneratorStats::default();

    info!("Generator running every {:?} -> {}", tick, tx.describe());

    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            instant = interval.tick() => {
                stats.ticks += 1;
                match blocking_io(|| state.step(instant.into_std(), &mut tx)) {
                    TransmitOutcome::Sent(_) => stats.sent += 1,
                    TransmitOutcome::Failed(..) => stats.failed += 1,
                    TransmitOutcome::Unchanged => {}
                }
            }
        }
    }

    tokio::time::sleep(grace).await;
    if let Err(e) = blocking_io(|| tx.close()) {
        warn!("Failed to close {}: {}", tx.describe(), e);
    }
    debug!(
        "Generator stopped after {} ticks ({} sent, {} failed)",
        stats.ticks, stats.sent, stats.failed
    );
    stats
}

/// Why an input pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEnd {
    /// Quit key pressed
    Quit,
    /// The source ran dry (end of a replay script, closed terminal)
    Exhausted,
    /// Someone else triggered shutdown
    Shutdown,
}

/// Forward events from `source` into `state` until quit, exhaustion or shutdown
///
/// Quit and exhaustion trigger shutdown. On exhaustion the pump lingers for
/// `linger` first so the generator can transmit the final frame.
pub async fn run_input<S: InputSource + ?Sized>(
    source: &mut S,
    state: &SharedState,
    shutdown: &Shutdown,
    linger: Duration,
) -> InputEnd {
    info!("Reading keys from {}", source.name());

    let end = loop {
        tokio::select! {
            biased;
            _ = shutdown.wait() => break InputEnd::Shutdown,
            event = source.next_event() => match event {
                Some(event) => {
                    if !state.handle_event(event) {
                        break InputEnd::Quit;
                    }
                }
                None => break InputEnd::Exhausted,
            },
        }
    };

    match end {
        InputEnd::Quit => shutdown.trigger(),
        InputEnd::Exhausted => {
            info!("{} input ended", source.name());
            tokio::select! {
                _ = shutdown.wait() => {}
                _ = tokio::time::sleep(linger) => {}
            }
            shutdown.trigger();
        }
        InputEnd::Shutdown => {}
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ControllerConfig, FailurePolicy};
    use crate::input::{KeyAction, KeyEvent, ScriptedInput};
    use keyppm_link::{LinkError, MemoryTransmitter};

    /// Link whose writes stall the calling thread
    struct SlowTransmitter(Duration);

    impl ChannelTransmitter for SlowTransmitter {
        fn send_line(&mut self, _line: &str) -> Result<(), LinkError> {
            std::thread::sleep(self.0);
            Ok(())
        }

        fn close(&mut self) -> Result<(), LinkError> {
            Ok(())
        }

        fn describe(&self) -> String {
            "slow".to_string()
        }
    }

    #[tokio::test]
    async fn test_shutdown_wait_after_trigger() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());
        let waiter = shutdown.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });
        shutdown.trigger();
        shutdown.trigger();
        handle.await.unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_generator_closes_after_grace() {
        let state = Arc::new(SharedState::new(&ControllerConfig::default()).unwrap());
        let tx = MemoryTransmitter::new();
        let sent = tx.handle();
        let shutdown = Shutdown::new();

        let task = tokio::spawn(run_generator(
            state,
            tx,
            Duration::from_millis(20),
            Duration::from_millis(50),
            shutdown.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(110)).await;
        shutdown.trigger();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!sent.is_closed());

        let stats = task.await.unwrap();
        assert!(sent.is_closed());
        assert_eq!(stats.sent, 0);
        assert!(stats.ticks >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_key_stops_pump() {
        let state = SharedState::new(&ControllerConfig::default()).unwrap();
        let shutdown = Shutdown::new();
        let mut input = ScriptedInput::parse("tap 1\npress q\npress 2").unwrap();

        let end = run_input(&mut input, &state, &shutdown, Duration::ZERO).await;
        assert_eq!(end, InputEnd::Quit);
        assert!(shutdown.is_triggered());
        // `press 2` was never delivered
        assert_eq!(input.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_policy_resends_each_tick() {
        let mut config = ControllerConfig::default();
        config.on_failure = FailurePolicy::Retry;
        let state = Arc::new(SharedState::new(&config).unwrap());
        let tx = MemoryTransmitter::new();
        let sent = tx.handle();
        sent.fail_next(2);
        let shutdown = Shutdown::new();

        let generator = tokio::spawn(run_generator(
            state.clone(),
            tx,
            Duration::from_millis(20),
            Duration::ZERO,
            shutdown.clone(),
        ));
        let mut input = ScriptedInput::parse("press 3\nwait 200").unwrap();
        run_input(&mut input, &state, &shutdown, Duration::ZERO).await;

        let stats = generator.await.unwrap();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.sent, 1);
        assert_eq!(
            sent.lines(),
            vec!["1500,1500,2000,1500,1500,1500,1500,1500".to_string()]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_slow_write_leaves_worker_free() {
        let state = Arc::new(SharedState::new(&ControllerConfig::default()).unwrap());
        state.handle_event(KeyEvent::digit(1, KeyAction::Press).unwrap());
        let shutdown = Shutdown::new();

        let started = std::time::Instant::now();
        let generator = tokio::spawn(run_generator(
            state,
            SlowTransmitter(Duration::from_millis(500)),
            Duration::from_millis(20),
            Duration::ZERO,
            shutdown.clone(),
        ));
        // Let the first tick enter the write
        std::thread::sleep(Duration::from_millis(50));

        let other = tokio::spawn(async { std::time::Instant::now() });
        let ran_at = other.await.unwrap();
        assert!(ran_at - started < Duration::from_millis(400));

        shutdown.trigger();
        let stats = generator.await.unwrap();
        assert_eq!(stats.sent, 1);
    }
}
