//! The guard object applications construct and share.
//!
//! A `Shield` is a handle onto the process-wide signal state and listener,
//! plus a default logger. Every shield built in a process shares one
//! [`SignalState`] and one [`HandlerInstaller`], so a section opened through
//! any shield protects the whole process and handlers register only once.
//! The first shield built fixes the terminator; the first install fixes the
//! listener's logger.

use crate::handler::{Disposition, ProcessExit, SignalHandler, Terminator};
use crate::installer::{HandlerInstaller, ShieldError};
use crate::logger::{Logger, TracingLogger};
use crate::section::{Outcome, ProtectedSection};
use crate::signal::WatchedSignal;
use crate::state::{Phase, SignalState};
use std::future::Future;
use std::sync::{Arc, OnceLock};

/// Installer (and through it the signal state) shared by every shield.
static PROCESS_INSTALLER: OnceLock<Arc<HandlerInstaller>> = OnceLock::new();

pub struct Shield {
    state: Arc<SignalState>,
    installer: Arc<HandlerInstaller>,
    logger: Arc<dyn Logger>,
}

/// Builder for [`Shield`]; defaults to [`TracingLogger`] and [`ProcessExit`].
pub struct ShieldBuilder {
    logger: Arc<dyn Logger>,
    terminator: Arc<dyn Terminator>,
}

impl Default for ShieldBuilder {
    fn default() -> Self {
        Self {
            logger: Arc::new(TracingLogger),
            terminator: Arc::new(ProcessExit),
        }
    }
}

impl ShieldBuilder {
    /// Logger used when a call does not supply its own.
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Only takes effect on the first shield built in the process.
    pub fn terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = terminator;
        self
    }

    /// Attach to the process-wide state, creating it on first use.
    pub fn build(self) -> Shield {
        let ShieldBuilder { logger, terminator } = self;
        let installer = PROCESS_INSTALLER.get_or_init(|| {
            Arc::new(HandlerInstaller::new(
                Arc::new(SignalState::new()),
                terminator,
            ))
        });
        Shield::from_installer(Arc::clone(installer), logger)
    }

    /// Shield with its own state and installer, detached from the process.
    #[cfg(test)]
    pub(crate) fn build_private(self) -> Shield {
        let installer = HandlerInstaller::new(Arc::new(SignalState::new()), self.terminator);
        Shield::from_installer(Arc::new(installer), self.logger)
    }
}

impl Default for Shield {
    fn default() -> Self {
        Self::new()
    }
}

impl Shield {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ShieldBuilder {
        ShieldBuilder::default()
    }

    fn from_installer(installer: Arc<HandlerInstaller>, logger: Arc<dyn Logger>) -> Self {
        Self {
            state: Arc::clone(installer.state()),
            installer,
            logger,
        }
    }

    pub fn ensure_installed(&self) -> Result<Arc<SignalState>, ShieldError> {
        self.installer.ensure_installed(Arc::clone(&self.logger))
    }

    /// Install with a specific logger. Ignored if already installed.
    pub fn ensure_installed_with(
        &self,
        logger: Arc<dyn Logger>,
    ) -> Result<Arc<SignalState>, ShieldError> {
        self.installer.ensure_installed(logger)
    }

    /// Open a protected section using the shield's default logger.
    pub fn enter(&self) -> Result<ProtectedSection, ShieldError> {
        self.enter_with(Arc::clone(&self.logger))
    }

    pub fn enter_with(&self, logger: Arc<dyn Logger>) -> Result<ProtectedSection, ShieldError> {
        let state = self.installer.ensure_installed(Arc::clone(&logger))?;
        Ok(ProtectedSection::open(
            state,
            logger,
            Arc::clone(self.installer.terminator()),
        ))
    }

    /// Run `body` with signals deferred until it returns.
    ///
    /// The body's return value, including any `Err` it produces, comes back
    /// unchanged in `Outcome::Continue`. A signal received while it ran wins
    /// over that value and yields `Outcome::Terminate`. If the process is
    /// already committed to exiting, `body` is not run at all.
    pub fn protect<R>(&self, body: impl FnOnce() -> R) -> Result<Outcome<R>, ShieldError> {
        self.protect_with(Arc::clone(&self.logger), body)
    }

    pub fn protect_with<R>(
        &self,
        logger: Arc<dyn Logger>,
        body: impl FnOnce() -> R,
    ) -> Result<Outcome<R>, ShieldError> {
        if let Some(code) = self.state.exit_code() {
            return Ok(Outcome::Terminate(code));
        }
        let section = self.enter_with(logger)?;
        let value = body();
        Ok(section.exit().map(|()| value))
    }

    /// Async counterpart of [`Shield::protect`]. The future is polled to
    /// completion; dropping it mid-way closes the section like a panic would.
    pub async fn protect_async<F>(&self, work: F) -> Result<Outcome<F::Output>, ShieldError>
    where
        F: Future,
    {
        if let Some(code) = self.state.exit_code() {
            return Ok(Outcome::Terminate(code));
        }
        let section = self.enter()?;
        let value = work.await;
        Ok(section.exit().map(|()| value))
    }

    /// Feed a signal through the same path the OS listener uses.
    ///
    /// Uses the installed handler when there is one, so the logger bound at
    /// install time sees the message. An `Exit` disposition is passed to the
    /// terminator exactly as a real delivery would be.
    pub fn deliver(&self, signal: WatchedSignal) -> Disposition {
        let disposition = match self.installer.bound_handler() {
            Some(handler) => handler.handle(signal),
            None => {
                SignalHandler::new(Arc::clone(&self.state), Arc::clone(&self.logger))
                    .handle(signal)
            }
        };
        if let Disposition::Exit(code) = disposition {
            self.installer.terminator().terminate(code);
        }
        disposition
    }

    pub fn state(&self) -> &Arc<SignalState> {
        &self.state
    }

    pub fn installer(&self) -> &HandlerInstaller {
        &self.installer
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Signal recorded but not yet acted upon, if any.
    pub fn pending(&self) -> Option<WatchedSignal> {
        if self.state.is_exiting() {
            None
        } else {
            self.state.received()
        }
    }

    pub fn is_protected(&self) -> bool {
        self.state.is_protected()
    }
}

impl std::fmt::Debug for Shield {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shield")
            .field("state", &self.state)
            .field("installer", &self.installer)
            .finish_non_exhaustive()
    }
}
