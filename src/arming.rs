//! Arm-then-act gating for protected keys
//!
//! Tapping `0` arms. The next press of a protected key consumes the arm and
//! authorizes that key until it is released. Every other protected press is
//! refused.

use crate::keys::{KeyId, KEY_COUNT};

/// Observable state of the one-shot arm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmPhase {
    Unarmed,
    Armed,
}

/// What a press did to the arm state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    /// The arm key was pressed
    Armed,
    /// A protected key consumed the arm
    Authorized(KeyId),
    /// A protected key was pressed without a pending arm
    Denied(KeyId),
    /// Not a protected key; arm state untouched
    Unaffected,
}

#[derive(Debug, Clone)]
pub struct ArmingState {
    armed: bool,
    protected: [bool; KEY_COUNT],
    authorized: [bool; KEY_COUNT],
}

impl ArmingState {
    /// `protected` lists the keys that need the arm gesture
    pub fn new(protected: impl IntoIterator<Item = KeyId>) -> Self {
        let mut mask = [false; KEY_COUNT];
        for key in protected {
            if !key.is_arm() {
                mask[key.index()] = true;
            }
        }
        Self {
            armed: false,
            protected: mask,
            authorized: [false; KEY_COUNT],
        }
    }

    /// Apply a press transition. Must be called once per physical press.
    pub fn on_press(&mut self, key: KeyId) -> ArmOutcome {
        if key.is_arm() {
            self.armed = true;
            return ArmOutcome::Armed;
        }
        if !self.is_protected(key) {
            return ArmOutcome::Unaffected;
        }

        if self.armed {
            self.armed = false;
            // At most one authorized key: a new gesture revokes the old one.
            self.authorized = [false; KEY_COUNT];
            self.authorized[key.index()] = true;
            ArmOutcome::Authorized(key)
        } else {
            self.authorized[key.index()] = false;
            ArmOutcome::Denied(key)
        }
    }

    /// Apply a release transition
    pub fn on_release(&mut self, key: KeyId) {
        if self.is_protected(key) {
            self.authorized[key.index()] = false;
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn phase(&self) -> ArmPhase {
        if self.armed {
            ArmPhase::Armed
        } else {
            ArmPhase::Unarmed
        }
    }

    pub fn is_protected(&self, key: KeyId) -> bool {
        self.protected[key.index()]
    }

    pub fn is_authorized(&self, key: KeyId) -> bool {
        self.authorized[key.index()]
    }

    /// The currently authorized key, if any
    pub fn authorized_key(&self) -> Option<KeyId> {
        KeyId::all().find(|&k| self.is_authorized(k))
    }
}
