//! Change-gated transmission
//!
//! The generator runs at a fixed rate but the link only sees a line when the
//! frame actually changed, so the encoder (and any LEDs hanging off it) is
//! never flooded with identical updates.

use keyppm_link::{ChannelTransmitter, LinkError};
use tracing::{debug, warn};

use crate::config::FailurePolicy;
use crate::frame::ChannelFrame;

/// A frame that differs from the last one sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub frame: ChannelFrame,
    pub line: String,
}

/// Result of one gated transmission attempt
#[derive(Debug)]
pub enum TransmitOutcome {
    Unchanged,
    Sent(String),
    Failed(String, LinkError),
}

/// Remembers the last frame handed to the link
#[derive(Debug, Clone)]
pub struct ChangeGate {
    last_sent: ChannelFrame,
    policy: FailurePolicy,
}

impl ChangeGate {
    /// `initial` is treated as already sent
    pub fn new(initial: ChannelFrame, policy: FailurePolicy) -> Self {
        Self {
            last_sent: initial,
            policy,
        }
    }

    /// Compare `frame` with the snapshot; `None` means no I/O is needed
    pub fn stage(&self, frame: &ChannelFrame) -> Option<PendingSend> {
        (*frame != self.last_sent).then(|| PendingSend {
            frame: *frame,
            line: frame.to_line(),
        })
    }

    /// Record the result of sending `pending`
    pub fn complete(&mut self, pending: &PendingSend, ok: bool) {
        match (ok, self.policy) {
            (true, _) | (false, FailurePolicy::Drop) => self.last_sent = pending.frame,
            (false, FailurePolicy::Retry) => {}
        }
    }

    pub fn last_sent(&self) -> &ChannelFrame {
        &self.last_sent
    }
}

/// Write a staged line, logging the result
pub fn send<T: ChannelTransmitter + ?Sized>(tx: &mut T, pending: &PendingSend) -> TransmitOutcome {
    let line = pending.frame.to_string();
    match tx.send_line(&pending.line) {
        Ok(()) => {
            debug!("Sent: {}", line);
            TransmitOutcome::Sent(line)
        }
        Err(e) => {
            warn!("Serial write error: {}", e);
            TransmitOutcome::Failed(line, e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyppm_link::MemoryTransmitter;

    /// One generator tick's worth of gating
    fn attempt(
        gate: &mut ChangeGate,
        frame: &ChannelFrame,
        tx: &mut MemoryTransmitter,
    ) -> TransmitOutcome {
        let Some(pending) = gate.stage(frame) else {
            return TransmitOutcome::Unchanged;
        };
        let outcome = send(tx, &pending);
        gate.complete(&pending, matches!(outcome, TransmitOutcome::Sent(_)));
        outcome
    }

    fn frame_with(ch0: u16) -> ChannelFrame {
        let mut frame = ChannelFrame::default();
        frame.set(0, ch0);
        frame
    }

    #[test]
    fn test_identical_frame_is_not_sent() {
        let mut gate = ChangeGate::new(ChannelFrame::default(), FailurePolicy::Drop);
        let mut tx = MemoryTransmitter::new();
        let handle = tx.handle();
        assert!(matches!(
            attempt(&mut gate, &ChannelFrame::default(), &mut tx),
            TransmitOutcome::Unchanged
        ));
        assert_eq!(handle.attempts(), 0);
    }

    #[test]
    fn test_change_sent_once() {
        let mut gate = ChangeGate::new(ChannelFrame::default(), FailurePolicy::Drop);
        let mut tx = MemoryTransmitter::new();
        let handle = tx.handle();
        let frame = frame_with(2000);
        attempt(&mut gate, &frame, &mut tx);
        attempt(&mut gate, &frame, &mut tx);
        assert_eq!(
            handle.lines(),
            vec!["2000,1500,1500,1500,1500,1500,1500,1500".to_string()]
        );
        assert_eq!(gate.last_sent(), &frame);
    }

    #[test]
    fn test_drop_policy_advances_on_failure() {
        let mut gate = ChangeGate::new(ChannelFrame::default(), FailurePolicy::Drop);
        let mut tx = MemoryTransmitter::new();
        let handle = tx.handle();
        handle.fail_next(1);
        let frame = frame_with(2000);
        assert!(matches!(
            attempt(&mut gate, &frame, &mut tx),
            TransmitOutcome::Failed(..)
        ));
        assert!(matches!(
            attempt(&mut gate, &frame, &mut tx),
            TransmitOutcome::Unchanged
        ));
        assert!(handle.lines().is_empty());
        assert_eq!(handle.attempts(), 1);
    }

    #[test]
    fn test_retry_policy_resends_after_failure() {
        let mut gate = ChangeGate::new(ChannelFrame::default(), FailurePolicy::Retry);
        let mut tx = MemoryTransmitter::new();
        let handle = tx.handle();
        handle.fail_next(1);
        let frame = frame_with(2000);
        attempt(&mut gate, &frame, &mut tx);
        assert_eq!(gate.last_sent(), &ChannelFrame::default());
        assert!(matches!(
            attempt(&mut gate, &frame, &mut tx),
            TransmitOutcome::Sent(_)
        ));
        assert_eq!(handle.attempts(), 2);
        assert_eq!(handle.lines().len(), 1);
    }

    #[test]
    fn test_stage_produces_wire_line() {
        let gate = ChangeGate::new(ChannelFrame::default(), FailurePolicy::Drop);
        let pending = gate.stage(&frame_with(1000)).unwrap();
        assert_eq!(pending.line, "1000,1500,1500,1500,1500,1500,1500,1500\n");
    }
}
