//! Scoped protected sections and the typed outcome they report.

use crate::handler::Terminator;
use crate::logger::Logger;
use crate::state::SignalState;
use std::sync::Arc;

/// Result of running work under protection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a Terminate outcome means the process must exit"]
pub enum Outcome<T> {
    /// No signal is pending; carries the body's own result unchanged.
    Continue(T),
    /// A signal was deferred; the process must exit with this code.
    Terminate(i32),
}

impl<T> Outcome<T> {
    pub fn is_terminate(&self) -> bool {
        matches!(self, Outcome::Terminate(_))
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Outcome::Continue(_) => None,
            Outcome::Terminate(code) => Some(*code),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Continue(value) => Outcome::Continue(f(value)),
            Outcome::Terminate(code) => Outcome::Terminate(code),
        }
    }

    pub fn into_continue(self) -> Option<T> {
        match self {
            Outcome::Continue(value) => Some(value),
            Outcome::Terminate(_) => None,
        }
    }

    /// Unwrap the body's value, or exit the process.
    ///
    /// Meant for the top-level entry point only; library code should pass
    /// the outcome up instead.
    pub fn or_exit(self) -> T {
        match self {
            Outcome::Continue(value) => value,
            Outcome::Terminate(code) => {
                tracing::info!(code, "deferred signal handled, exiting");
                std::process::exit(code)
            }
        }
    }
}

/// Guard marking a protected section as active.
///
/// Signals delivered while any section is alive are deferred. Call
/// [`ProtectedSection::exit`] to learn whether the process should now
/// terminate. If the guard is dropped instead (early return, panic unwind,
/// cancelled future) and a signal is due, the shield's terminator is invoked
/// directly because there is no caller left to hand an outcome to.
#[must_use = "dropping the section immediately ends protection"]
pub struct ProtectedSection {
    state: Arc<SignalState>,
    logger: Arc<dyn Logger>,
    terminator: Arc<dyn Terminator>,
    closed: bool,
}

impl ProtectedSection {
    /// Mark a section active. The caller guarantees handlers are installed.
    pub(crate) fn open(
        state: Arc<SignalState>,
        logger: Arc<dyn Logger>,
        terminator: Arc<dyn Terminator>,
    ) -> Self {
        let depth = state.enter();
        tracing::trace!(depth, "entered protected section");
        Self {
            state,
            logger,
            terminator,
            closed: false,
        }
    }

    /// End protection and report whether a deferred signal is now due.
    pub fn exit(mut self) -> Outcome<()> {
        self.closed = true;
        self.close()
    }

    /// Depth is dropped before the signal slot is read; see
    /// `SignalHandler::handle` for the other half of this ordering.
    fn close(&self) -> Outcome<()> {
        let remaining = self.state.leave();
        tracing::trace!(depth = remaining, "left protected section");
        if remaining > 0 {
            // An enclosing section is still running; it will act on the signal.
            return Outcome::Continue(());
        }

        match self.state.received() {
            Some(signal) => {
                let code = signal.exit_code();
                self.state.mark_exiting(code);
                self.logger.info(&format!(
                    "protected section completed, exiting with code {code} ({})",
                    signal.name()
                ));
                Outcome::Terminate(code)
            }
            None => Outcome::Continue(()),
        }
    }
}

impl Drop for ProtectedSection {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Outcome::Terminate(code) = self.close() {
            self.terminator.terminate(code);
        }
    }
}

impl std::fmt::Debug for ProtectedSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectedSection")
            .field("depth", &self.state.depth())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
