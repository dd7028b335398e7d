use std::{path::PathBuf, process::Stdio};

use nix::{
    errno::Errno,
    sys::signal::{kill, Signal},
};
use tokio::{process::Command, sync::mpsc};

use crate::{
    messaging::{ExitOutcome, TerminationEvent},
    supervisor::registry::{WorkerHandle, WorkerIndex},
};

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn worker P{index}: {source}")]
    Io {
        index: WorkerIndex,
        source: std::io::Error,
    },
    #[error("worker P{index} exited before its pid could be read")]
    NoPid { index: WorkerIndex },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalDeliveryError {
    /// The target already exited. Callers treat this as a no-op.
    #[error("process {0} does not exist")]
    NoSuchProcess(WorkerHandle),
    #[error("{0} does not name a single process")]
    InvalidPid(WorkerHandle),
    #[error("failed to signal process {handle}: {errno}")]
    Failed { handle: WorkerHandle, errno: Errno },
}

/// Creates and kills worker processes on behalf of the supervisor.
///
/// Implementations report every termination of a spawned worker exactly once on
/// the `events` channel handed to [`Launcher::spawn`].
pub trait Launcher: Send + 'static {
    fn spawn(
        &mut self,
        index: WorkerIndex,
        supervisor: WorkerHandle,
        events: &mpsc::UnboundedSender<TerminationEvent>,
    ) -> Result<WorkerHandle, SpawnError>;

    /// Delivers the termination signal to a worker.
    fn terminate(&mut self, handle: WorkerHandle) -> Result<(), SignalDeliveryError>;
}

/// Runs workers as child processes of the current program.
///
/// Each child is started as
/// `<program> worker --output <path> --index <i> --supervisor <pid>` and a
/// reaper task forwards its exit status.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    output: PathBuf,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            output: output.into(),
        }
    }

    fn command(&self, index: WorkerIndex, supervisor: WorkerHandle) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("worker")
            .arg("--output")
            .arg(&self.output)
            .arg("--index")
            .arg(index.to_string())
            .arg("--supervisor")
            .arg(supervisor.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            // Orphaned workers keep running when the supervisor goes away.
            .kill_on_drop(false);
        cmd
    }
}

impl Launcher for ProcessLauncher {
    fn spawn(
        &mut self,
        index: WorkerIndex,
        supervisor: WorkerHandle,
        events: &mpsc::UnboundedSender<TerminationEvent>,
    ) -> Result<WorkerHandle, SpawnError> {
        let mut child = self
            .command(index, supervisor)
            .spawn()
            .map_err(|source| SpawnError::Io { index, source })?;
        let handle = child
            .id()
            .map(WorkerHandle::new)
            .ok_or(SpawnError::NoPid { index })?;

        let tx = events.clone();
        tokio::spawn(async move {
            let outcome = match child.wait().await {
                Ok(status) => ExitOutcome::from_status(status),
                Err(e) => {
                    tracing::warn!(index, pid = %handle, error = %e, "failed to reap worker");
                    ExitOutcome::Unknown
                }
            };
            let _ = tx.send(TerminationEvent::new(handle, outcome));
        });

        Ok(handle)
    }

    fn terminate(&mut self, handle: WorkerHandle) -> Result<(), SignalDeliveryError> {
        send_terminate(handle)
    }
}

/// Sends SIGTERM to `handle`.
pub fn send_terminate(handle: WorkerHandle) -> Result<(), SignalDeliveryError> {
    let pid = handle
        .as_pid()
        .ok_or(SignalDeliveryError::InvalidPid(handle))?;
    match kill(pid, Signal::SIGTERM) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(SignalDeliveryError::NoSuchProcess(handle)),
        Err(errno) => Err(SignalDeliveryError::Failed { handle, errno }),
    }
}
