use crate::logger::Logger;
use crate::signal::WatchedSignal;
use crate::state::SignalState;
use std::sync::Arc;

/// What the handler decided to do with a delivered signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A section is active; the signal is recorded and acted on when it ends.
    Deferred,
    /// No section is active; the process must exit now with this code.
    Exit(i32),
}

/// Performs the actual process exit once holdfast has decided on one.
pub trait Terminator: Send + Sync {
    fn terminate(&self, code: i32);
}

/// Production terminator: `std::process::exit`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExit;

impl Terminator for ProcessExit {
    fn terminate(&self, code: i32) {
        std::process::exit(code);
    }
}

/// Reaction to a delivered SIGINT/SIGTERM.
///
/// Bound to the logger that was current when handlers were installed; later
/// loggers never reach it.
#[derive(Clone)]
pub struct SignalHandler {
    state: Arc<SignalState>,
    logger: Arc<dyn Logger>,
}

impl SignalHandler {
    pub fn new(state: Arc<SignalState>, logger: Arc<dyn Logger>) -> Self {
        Self { state, logger }
    }

    /// Record the signal, then exit immediately unless a section is active.
    ///
    /// The signal is stored before the depth is read. Section exit does the
    /// reverse (drop depth, then read the slot), so a signal racing a section's
    /// end is always seen by at least one side.
    pub fn handle(&self, signal: WatchedSignal) -> Disposition {
        self.logger
            .warning(&format!("signal received: {signal}, will exit"));

        self.state.record(signal);

        if self.state.is_protected() {
            return Disposition::Deferred;
        }

        let code = signal.exit_code();
        self.state.mark_exiting(code);
        self.logger
            .info(&format!("exiting immediately with code {code}"));
        Disposition::Exit(code)
    }

    pub fn state(&self) -> &Arc<SignalState> {
        &self.state
    }
}

impl std::fmt::Debug for SignalHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHandler")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
