//! One-time registration of the SIGINT/SIGTERM listener.
//!
//! The listener is a dedicated OS thread driving a current-thread tokio
//! runtime. It owns the `tokio::signal::unix` streams, runs the bound
//! [`SignalHandler`] for each delivery, and hands `Exit` dispositions to the
//! shield's [`Terminator`].

use crate::handler::{Disposition, SignalHandler, Terminator};
use crate::logger::Logger;
use crate::signal::WatchedSignal;
use crate::state::SignalState;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, OnceLock, PoisonError};
use tokio::signal::unix::{signal, Signal, SignalKind};

const LISTENER_THREAD_NAME: &str = "holdfast-signals";

/// Listener threads started in this process, across all installers.
static PROCESS_REGISTRATIONS: AtomicUsize = AtomicUsize::new(0);

/// How many signal listeners this process has started.
pub fn process_registrations() -> usize {
    PROCESS_REGISTRATIONS.load(Ordering::SeqCst)
}

/// Errors that can occur while installing the signal listener.
#[derive(Debug)]
pub enum ShieldError {
    /// Failed to build the listener's tokio runtime.
    Runtime { source: std::io::Error },
    /// Failed to register a listener for one signal.
    Register {
        signal: WatchedSignal,
        source: std::io::Error,
    },
    /// Failed to spawn the listener thread.
    Thread { source: std::io::Error },
    /// The listener thread went away before reporting readiness.
    ListenerExited,
}

impl std::fmt::Display for ShieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShieldError::Runtime { source } => {
                write!(f, "failed to build signal listener runtime: {}", source)
            }
            ShieldError::Register { signal, source } => {
                write!(f, "failed to register handler for {}: {}", signal.name(), source)
            }
            ShieldError::Thread { source } => {
                write!(f, "failed to spawn signal listener thread: {}", source)
            }
            ShieldError::ListenerExited => {
                write!(f, "signal listener thread exited during startup")
            }
        }
    }
}

impl std::error::Error for ShieldError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShieldError::Runtime { source } => Some(source),
            ShieldError::Register { source, .. } => Some(source),
            ShieldError::Thread { source } => Some(source),
            ShieldError::ListenerExited => None,
        }
    }
}

pub struct HandlerInstaller {
    state: Arc<SignalState>,
    terminator: Arc<dyn Terminator>,
    /// Serializes registration only; readers check `state.is_installed()`.
    install_lock: Mutex<()>,
    registrations: AtomicUsize,
    /// Handler the listener runs, fixed by the first successful install.
    bound: OnceLock<SignalHandler>,
}

impl HandlerInstaller {
    pub fn new(state: Arc<SignalState>, terminator: Arc<dyn Terminator>) -> Self {
        Self {
            state,
            terminator,
            install_lock: Mutex::new(()),
            registrations: AtomicUsize::new(0),
            bound: OnceLock::new(),
        }
    }

    /// Register the listener on first call; no-op afterwards.
    ///
    /// The first successful call binds `logger` to the listener for good. A
    /// logger passed on any later call is ignored. A failed registration
    /// leaves the state untouched so a later call can try again.
    pub fn ensure_installed(
        &self,
        logger: Arc<dyn Logger>,
    ) -> Result<Arc<SignalState>, ShieldError> {
        if self.state.is_installed() {
            return Ok(Arc::clone(&self.state));
        }

        let _guard = self
            .install_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.state.is_installed() {
            return Ok(Arc::clone(&self.state));
        }

        let handler = SignalHandler::new(Arc::clone(&self.state), Arc::clone(&logger));
        spawn_listener(handler.clone(), Arc::clone(&self.terminator))?;

        let _ = self.bound.set(handler);
        self.registrations.fetch_add(1, Ordering::SeqCst);
        self.state.mark_installed();
        logger.debug("signal handlers registered for SIGINT and SIGTERM");
        tracing::debug!(thread = LISTENER_THREAD_NAME, "signal listener started");

        Ok(Arc::clone(&self.state))
    }

    /// How many times registration actually happened (0 or 1).
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn is_installed(&self) -> bool {
        self.state.is_installed()
    }

    pub fn state(&self) -> &Arc<SignalState> {
        &self.state
    }

    /// The handler the listener is running, once installed.
    pub fn bound_handler(&self) -> Option<&SignalHandler> {
        self.bound.get()
    }

    pub(crate) fn terminator(&self) -> &Arc<dyn Terminator> {
        &self.terminator
    }
}

impl std::fmt::Debug for HandlerInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerInstaller")
            .field("installed", &self.is_installed())
            .field("registrations", &self.registrations())
            .finish_non_exhaustive()
    }
}

/// Start the listener thread and wait until both streams are registered.
///
/// The runtime is built and dropped on the listener thread itself, so this is
/// safe to call from inside another tokio runtime.
fn spawn_listener(
    handler: SignalHandler,
    terminator: Arc<dyn Terminator>,
) -> Result<(), ShieldError> {
    let (ready_tx, ready_rx) = mpsc::channel::<Result<(), ShieldError>>();

    std::thread::Builder::new()
        .name(LISTENER_THREAD_NAME.to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(source) => {
                    let _ = ready_tx.send(Err(ShieldError::Runtime { source }));
                    return;
                }
            };

            runtime.block_on(async move {
                let streams = match register_streams() {
                    Ok(streams) => streams,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                listen(streams, handler, terminator).await;
            });
        })
        .map_err(|source| ShieldError::Thread { source })?;

    ready_rx.recv().map_err(|_| ShieldError::ListenerExited)??;
    PROCESS_REGISTRATIONS.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

struct Streams {
    interrupt: Signal,
    terminate: Signal,
}

fn register_streams() -> Result<Streams, ShieldError> {
    let interrupt = signal(SignalKind::interrupt()).map_err(|source| ShieldError::Register {
        signal: WatchedSignal::Interrupt,
        source,
    })?;
    let terminate = signal(SignalKind::terminate()).map_err(|source| ShieldError::Register {
        signal: WatchedSignal::Terminate,
        source,
    })?;
    Ok(Streams {
        interrupt,
        terminate,
    })
}

async fn listen(mut streams: Streams, handler: SignalHandler, terminator: Arc<dyn Terminator>) {
    loop {
        let signal = tokio::select! {
            Some(()) = streams.interrupt.recv() => WatchedSignal::Interrupt,
            Some(()) = streams.terminate.recv() => WatchedSignal::Terminate,
            else => break,
        };

        if let Disposition::Exit(code) = handler.handle(signal) {
            terminator.terminate(code);
        }
    }
    tracing::debug!("signal streams closed, listener exiting");
}
