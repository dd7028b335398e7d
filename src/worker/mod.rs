pub(crate) mod signals;

use std::io;

use nix::{sys::signal::Signal, unistd::Pid};

pub use signals::{SignalDelivery, SignalListener, MONITORED_SIGNALS};

use crate::{
    messaging::{EXIT_MASS_RESTART, EXIT_STOPPED},
    output::OutputLog,
    supervisor::registry::WorkerIndex,
};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to install signal handlers for P{index}: {source}")]
    Install { index: WorkerIndex, source: io::Error },
    #[error("signal channel of P{index} failed: {source}")]
    Listen { index: WorkerIndex, source: io::Error },
}

/// What a worker does in response to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// Write the signal number and keep waiting.
    LogOnly,
    /// Write the termination line and exit with this code.
    ExitWithCode(i32),
}

/// Decides how a worker reacts to `signal` sent by `sender`.
///
/// SIGTERM always terminates: with [`EXIT_MASS_RESTART`] when it came from the
/// supervisor, with [`EXIT_STOPPED`] otherwise. Every other signal is only
/// logged.
pub fn classify(signal: Signal, sender: Pid, supervisor: Pid) -> Reaction {
    match signal {
        Signal::SIGTERM if sender == supervisor => Reaction::ExitWithCode(EXIT_MASS_RESTART),
        Signal::SIGTERM => Reaction::ExitWithCode(EXIT_STOPPED),
        _ => Reaction::LogOnly,
    }
}

/// A pool member that idles until signalled.
#[derive(Debug, Clone)]
pub struct Worker {
    index: WorkerIndex,
    supervisor: Pid,
    output: OutputLog,
}

impl Worker {
    pub fn new(index: WorkerIndex, supervisor: Pid, output: OutputLog) -> Self {
        Self {
            index,
            supervisor,
            output,
        }
    }

    /// Installs the signal handlers and waits for signals until one of them
    /// asks the worker to exit. Returns the exit code to terminate with.
    pub fn run(&self) -> Result<i32, WorkerError> {
        let index = self.index;
        let mut listener = SignalListener::install(&MONITORED_SIGNALS)
            .map_err(|source| WorkerError::Install { index, source })?;

        self.write(&format!("P{index} is waiting for a signal"));
        tracing::debug!(index, supervisor = %self.supervisor, "worker ready");

        loop {
            let delivery = listener
                .next()
                .map_err(|source| WorkerError::Listen { index, source })?;
            if let Some(code) = self.react(delivery) {
                return Ok(code);
            }
        }
    }

    /// Applies [`classify`] to one delivery and writes the matching line.
    /// Returns the exit code if the worker must terminate.
    pub fn react(&self, delivery: SignalDelivery) -> Option<i32> {
        let index = self.index;
        let signo = delivery.signal as i32;
        match classify(delivery.signal, delivery.sender, self.supervisor) {
            Reaction::LogOnly => {
                self.write(&format!("P{index} received signal {signo}"));
                None
            }
            Reaction::ExitWithCode(code) => {
                self.write(&format!(
                    "P{index} received signal {signo}, terminating gracefully"
                ));
                tracing::debug!(index, sender = %delivery.sender, code, "worker exiting");
                Some(code)
            }
        }
    }

    fn write(&self, line: &str) {
        if let Err(e) = self.output.emit(line) {
            tracing::warn!(index = self.index, error = %e, "failed to write worker output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUPERVISOR: i32 = 4000;

    fn pid(raw: i32) -> Pid {
        Pid::from_raw(raw)
    }

    #[test]
    fn test_term_from_supervisor_exits_with_mass_restart_code() {
        let reaction = classify(Signal::SIGTERM, pid(SUPERVISOR), pid(SUPERVISOR));
        assert_eq!(reaction, Reaction::ExitWithCode(1));
    }

    #[test]
    fn test_term_from_anyone_else_exits_with_zero() {
        let reaction = classify(Signal::SIGTERM, pid(77), pid(SUPERVISOR));
        assert_eq!(reaction, Reaction::ExitWithCode(0));
    }

    #[test]
    fn test_other_signals_only_log() {
        for signal in MONITORED_SIGNALS
            .into_iter()
            .filter(|s| *s != Signal::SIGTERM)
        {
            assert_eq!(
                classify(signal, pid(SUPERVISOR), pid(SUPERVISOR)),
                Reaction::LogOnly
            );
            assert_eq!(classify(signal, pid(1), pid(SUPERVISOR)), Reaction::LogOnly);
        }
    }

    #[test]
    fn test_react_writes_protocol_lines() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputLog::new(dir.path().join("process_output"));
        let worker = Worker::new(3, pid(SUPERVISOR), output.clone());

        let hup = SignalDelivery {
            signal: Signal::SIGHUP,
            sender: pid(1),
        };
        assert_eq!(worker.react(hup), None);

        let term = SignalDelivery {
            signal: Signal::SIGTERM,
            sender: pid(SUPERVISOR),
        };
        assert_eq!(worker.react(term), Some(1));

        let contents = std::fs::read_to_string(output.path()).unwrap();
        assert_eq!(
            contents,
            "P3 received signal 1\nP3 received signal 15, terminating gracefully\n"
        );
    }
}
