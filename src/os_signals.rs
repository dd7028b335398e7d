//! Termination signals for the supervisor process.
//!
//! [`TerminationSignals::register`] should run before the pool starts so that an
//! early SIGTERM is not handled by the default disposition.

use tokio::signal::unix::{signal, Signal, SignalKind};

pub struct TerminationSignals {
    sigterm: Signal,
    sigint: Signal,
}

impl TerminationSignals {
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    /// Completes when SIGTERM or SIGINT is received.
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.sigterm.recv() => {},
            _ = self.sigint.recv() => {},
        }
    }
}
