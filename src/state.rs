//! Process-wide signal bookkeeping shared by the listener and every section.
//!
//! All fields are single atomics. Nothing here takes a lock: the listener
//! thread and application code only ever race on individual scalar writes.

use crate::signal::WatchedSignal;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

/// Current position in the shield's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Handlers not yet registered.
    Idle,
    /// Handlers live, no section active.
    Armed,
    /// At least one section active.
    Protected,
    /// The process is committed to exiting. Terminal.
    Exiting,
}

/// Slot value meaning "no signal received".
const NO_SIGNAL: i32 = 0;
/// Exit-code value meaning "not committed to exiting".
const NOT_EXITING: i32 = 0;

#[derive(Debug, Default)]
pub struct SignalState {
    /// Single-slot cell holding the last received signal number.
    received: AtomicI32,
    /// Protection depth; a section is active while this is non-zero.
    depth: AtomicUsize,
    installed: AtomicBool,
    /// Exit code the process is committed to, or zero.
    exiting: AtomicI32,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last signal delivered, if any. Never cleared once set.
    pub fn received(&self) -> Option<WatchedSignal> {
        match self.received.load(Ordering::SeqCst) {
            NO_SIGNAL => None,
            number => WatchedSignal::from_number(number),
        }
    }

    /// Overwrite the slot; the last delivered signal wins.
    pub fn record(&self, signal: WatchedSignal) {
        self.received.store(signal.number(), Ordering::SeqCst);
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_protected(&self) -> bool {
        self.depth() > 0
    }

    /// Returns the depth after entering.
    pub(crate) fn enter(&self) -> usize {
        self.depth.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the depth after leaving. Saturates at zero.
    pub(crate) fn leave(&self) -> usize {
        match self
            .depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| d.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => 0,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_installed(&self) {
        self.installed.store(true, Ordering::SeqCst);
    }

    pub fn is_exiting(&self) -> bool {
        self.exit_code().is_some()
    }

    /// Exit code decided by the handler or by a section's exit, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self.exiting.load(Ordering::SeqCst) {
            NOT_EXITING => None,
            code => Some(code),
        }
    }

    pub(crate) fn mark_exiting(&self, code: i32) {
        self.exiting.store(code, Ordering::SeqCst);
    }

    pub fn phase(&self) -> Phase {
        if self.is_exiting() {
            Phase::Exiting
        } else if self.is_protected() {
            Phase::Protected
        } else if self.is_installed() {
            Phase::Armed
        } else {
            Phase::Idle
        }
    }
}
