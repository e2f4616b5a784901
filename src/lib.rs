//! Defer SIGINT/SIGTERM while critical sections run.
//!
//! ```no_run
//! use holdfast::{Outcome, Shield};
//!
//! let shield = Shield::new();
//! let outcome = shield.protect(|| {
//!     // commit, acknowledge, flush...
//! })?;
//! if let Outcome::Terminate(code) = outcome {
//!     std::process::exit(code);
//! }
//! # Ok::<(), holdfast::ShieldError>(())
//! ```
//!
//! A signal arriving inside `protect` is recorded and acted on once the body
//! returns; one arriving outside any section exits the process immediately
//! with `128 + signal number`.

pub mod config;
pub mod handler;
pub mod installer;
pub mod logger;
pub mod runner;
pub mod section;
pub mod shield;
pub mod signal;
pub mod state;

pub use handler::{Disposition, ProcessExit, SignalHandler, Terminator};
pub use installer::{HandlerInstaller, ShieldError};
pub use logger::{Logger, TracingLogger};
pub use section::{Outcome, ProtectedSection};
pub use shield::{Shield, ShieldBuilder};
pub use signal::WatchedSignal;
pub use state::{Phase, SignalState};
