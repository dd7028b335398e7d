use std::process::ExitStatus;

use tokio::sync::oneshot;

use crate::supervisor::registry::{WorkerHandle, WorkerIndex};

/// Exit code of a worker asked to stop by someone other than the supervisor.
pub const EXIT_STOPPED: i32 = 0;
/// Exit code of a worker killed by the supervisor during a full-pool restart.
pub const EXIT_MASS_RESTART: i32 = 1;

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exited with code 0: stopped individually, restart it.
    Stopped,
    /// Exited with code 1: already handled by a full-pool restart.
    MassRestart,
    /// Any other exit code.
    Code(i32),
    /// Killed by a signal it did not handle.
    Signaled(i32),
    /// The exit status could not be collected.
    Unknown,
}

impl ExitOutcome {
    pub fn from_code(code: i32) -> Self {
        match code {
            EXIT_STOPPED => Self::Stopped,
            EXIT_MASS_RESTART => Self::MassRestart,
            other => Self::Code(other),
        }
    }

    pub fn from_status(status: ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.code(), status.signal()) {
            (Some(code), _) => Self::from_code(code),
            (None, Some(signal)) => Self::Signaled(signal),
            (None, None) => Self::Unknown,
        }
    }
}

impl std::fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "exited with code {EXIT_STOPPED}"),
            Self::MassRestart => write!(f, "exited with code {EXIT_MASS_RESTART}"),
            Self::Code(code) => write!(f, "exited with code {code}"),
            Self::Signaled(signal) => write!(f, "killed by signal {signal}"),
            Self::Unknown => write!(f, "exit status unavailable"),
        }
    }
}

/// Sent by a reaper when a worker process has terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationEvent {
    pub handle: WorkerHandle,
    pub outcome: ExitOutcome,
}

impl TerminationEvent {
    pub fn new(handle: WorkerHandle, outcome: ExitOutcome) -> Self {
        Self { handle, outcome }
    }
}

/// Commands sent to a running supervisor through its `SupervisorHandle`.
#[derive(Debug)]
pub(crate) enum SupervisorMessage {
    /// Reply with the current `(index, handle)` pairs.
    Workers(oneshot::Sender<Vec<(WorkerIndex, WorkerHandle)>>),
    /// Stop the event loop without touching the workers.
    Shutdown,
}
