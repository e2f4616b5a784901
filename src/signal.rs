//! The termination signals holdfast intercepts.
//!
//! Every other signal keeps its default OS disposition.

use nix::sys::signal::Signal;
use std::fmt;

/// Exit codes follow the shell convention of `128 + signal number`.
pub const EXIT_CODE_BASE: i32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchedSignal {
    /// SIGINT (Ctrl-C), POSIX signal 2.
    Interrupt,
    /// SIGTERM, POSIX signal 15.
    Terminate,
}

impl WatchedSignal {
    pub const ALL: [WatchedSignal; 2] = [WatchedSignal::Interrupt, WatchedSignal::Terminate];

    /// POSIX signal number.
    pub fn number(self) -> i32 {
        Signal::from(self) as i32
    }

    /// Process exit code reported when this signal causes termination.
    pub fn exit_code(self) -> i32 {
        EXIT_CODE_BASE + self.number()
    }

    pub fn name(self) -> &'static str {
        match self {
            WatchedSignal::Interrupt => "SIGINT",
            WatchedSignal::Terminate => "SIGTERM",
        }
    }

    /// Map a raw signal number back to a watched signal, if it is one.
    pub fn from_number(number: i32) -> Option<Self> {
        let signal = Signal::try_from(number).ok()?;
        Self::try_from(signal).ok()
    }
}

impl From<WatchedSignal> for Signal {
    fn from(signal: WatchedSignal) -> Self {
        match signal {
            WatchedSignal::Interrupt => Signal::SIGINT,
            WatchedSignal::Terminate => Signal::SIGTERM,
        }
    }
}

impl TryFrom<Signal> for WatchedSignal {
    type Error = Signal;

    fn try_from(signal: Signal) -> Result<Self, Self::Error> {
        match signal {
            Signal::SIGINT => Ok(WatchedSignal::Interrupt),
            Signal::SIGTERM => Ok(WatchedSignal::Terminate),
            other => Err(other),
        }
    }
}

impl fmt::Display for WatchedSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (signal {})", self.name(), self.number())
    }
}
