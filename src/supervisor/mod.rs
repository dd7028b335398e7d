pub(crate) mod builder;
pub(crate) mod handle;
pub(crate) mod launcher;
pub(crate) mod registry;

use std::time::Duration;

use tokio::sync::mpsc;

use crate::{
    announce::{Announcement, AnnouncementChannel},
    messaging::{ExitOutcome, SupervisorMessage, TerminationEvent},
    output::OutputLog,
    supervisor::{
        handle::SupervisorHandle,
        launcher::{Launcher, SignalDeliveryError, SpawnError},
        registry::{LookupError, Registry, WorkerHandle, WorkerIndex},
    },
};

/// Index the supervisor records for itself.
pub const SUPERVISOR_INDEX: WorkerIndex = 0;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("pool size must be at least 1")]
    EmptyPool,
    #[error("privileged index {index} is outside the worker range 1..={pool_size}")]
    InvalidPrivilegedIndex {
        index: WorkerIndex,
        pool_size: usize,
    },
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("worker registry is inconsistent: {0}")]
    Lookup(#[from] LookupError),
}

/// What the supervisor did about one termination event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The privileged worker died: every worker was killed and respawned.
    RestartAll,
    /// A single ordinary worker was respawned.
    RestartOne(WorkerIndex),
    /// Exit code 1 from an ordinary worker: a full restart already covers it.
    Suppressed(WorkerIndex),
    /// The instance was already replaced.
    Stale(WorkerIndex),
}

/// Keeps a fixed pool of worker processes alive.
///
/// Index 0 is the supervisor itself; indices `1..=N` are workers. When the
/// privileged worker dies the whole pool is killed and respawned, any other
/// worker that stops is respawned on its own. Every `(index, handle)` pair is
/// recorded in the registry before it is published on the announcement
/// channel.
pub struct Supervisor<L: Launcher> {
    launcher: L,
    registry: Registry,
    announcer: AnnouncementChannel,
    output: Option<OutputLog>,
    worker_output: Option<OutputLog>,
    identity: WorkerHandle,
    privileged: WorkerIndex,
    spawn_pacing: Duration,
    tx: mpsc::UnboundedSender<TerminationEvent>,
    rx: mpsc::UnboundedReceiver<TerminationEvent>,
    external_tx: mpsc::UnboundedSender<SupervisorMessage>,
    external_rx: mpsc::UnboundedReceiver<SupervisorMessage>,
}

impl<L: Launcher> Supervisor<L> {
    /// Runs the supervisor, consuming it and returning a handle for external control.
    pub fn run(self) -> SupervisorHandle {
        let external_tx = self.external_tx.clone();
        let join_handle = tokio::spawn(self.run_and_supervise());
        SupervisorHandle::new(join_handle, external_tx)
    }

    async fn run_and_supervise(mut self) -> Result<(), SupervisorError> {
        self.start_pool().await?;
        self.supervise().await
    }

    /// Records and announces the supervisor, then launches workers `1..=N`.
    async fn start_pool(&mut self) -> Result<(), SupervisorError> {
        for log in [&self.output, &self.worker_output].into_iter().flatten() {
            if let Err(e) = log.truncate() {
                tracing::warn!(path = %log.path().display(), error = %e, "failed to truncate output");
            }
        }

        self.registry.record(SUPERVISOR_INDEX, self.identity)?;
        self.announce(SUPERVISOR_INDEX, self.identity);

        for index in 1..=self.registry.pool_size() {
            self.launch(index)?;
            tokio::time::sleep(self.spawn_pacing).await;
        }
        tracing::info!(pool_size = self.registry.pool_size(), "worker pool started");
        Ok(())
    }

    async fn supervise(&mut self) -> Result<(), SupervisorError> {
        loop {
            tokio::select! {
                biased;
                Some(event) = self.rx.recv() => {
                    let decision = self.handle_termination(event)?;
                    tracing::trace!(?decision, "termination handled");
                },
                Some(msg) = self.external_rx.recv() => {
                    match msg {
                        SupervisorMessage::Workers(reply) => {
                            let _ = reply.send(self.registry.entries().collect());
                        }
                        SupervisorMessage::Shutdown => break,
                    }
                },
                else => break,
            }
        }
        tracing::info!("supervisor stopped");
        Ok(())
    }

    /// Classifies one termination event and applies the restart policy.
    pub(crate) fn handle_termination(
        &mut self,
        event: TerminationEvent,
    ) -> Result<Decision, SupervisorError> {
        let TerminationEvent { handle, outcome } = event;
        let index = self.registry.resolve(handle)?;
        tracing::debug!(index, pid = %handle, %outcome, "worker terminated");
        // The pid is reaped now and may be reused; never signal it again.
        self.registry.mark_exited(handle);

        // Detected by handle, whatever the exit code.
        if self.registry.current(self.privileged) == Some(handle) {
            self.restart_all()?;
            return Ok(Decision::RestartAll);
        }

        if index == SUPERVISOR_INDEX || !self.registry.is_current(handle) {
            tracing::debug!(index, pid = %handle, "ignoring exit of replaced instance");
            return Ok(Decision::Stale(index));
        }

        match outcome {
            ExitOutcome::MassRestart => {
                tracing::debug!(index, pid = %handle, "exit already covered by a full restart");
                Ok(Decision::Suppressed(index))
            }
            ExitOutcome::Stopped
            | ExitOutcome::Code(_)
            | ExitOutcome::Signaled(_)
            | ExitOutcome::Unknown => {
                self.say(&format!("P{index} is killed"));
                self.say(&format!("Restarting P{index}"));
                self.relaunch(index)?;
                Ok(Decision::RestartOne(index))
            }
        }
    }

    fn restart_all(&mut self) -> Result<(), SupervisorError> {
        let privileged = self.privileged;
        self.say(&format!(
            "P{privileged} is killed, all processes must be killed"
        ));

        let others: Vec<_> = self
            .registry
            .live_entries()
            .filter(|(index, _)| *index != SUPERVISOR_INDEX && *index != privileged)
            .collect();
        for (index, handle) in others {
            self.terminate(index, handle);
        }

        self.say("Restarting all processes");
        for index in 1..=self.registry.pool_size() {
            self.relaunch(index)?;
        }
        Ok(())
    }

    /// Spawns, records and announces a worker for `index`.
    fn launch(&mut self, index: WorkerIndex) -> Result<WorkerHandle, SupervisorError> {
        let handle = self.launcher.spawn(index, self.identity, &self.tx)?;
        self.registry.record(index, handle)?;
        self.announce(index, handle);
        self.say(&format!("P{index} is started and it has a pid of {handle}"));
        Ok(handle)
    }

    /// Like [`Self::launch`], but a failed spawn leaves the slot as it was.
    fn relaunch(&mut self, index: WorkerIndex) -> Result<(), SupervisorError> {
        match self.launch(index) {
            Ok(_) => Ok(()),
            Err(SupervisorError::Spawn(e)) => {
                tracing::error!(index, error = %e, "failed to restart worker");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn terminate(&mut self, index: WorkerIndex, handle: WorkerHandle) {
        match self.launcher.terminate(handle) {
            Ok(()) => tracing::debug!(index, pid = %handle, "sent SIGTERM"),
            Err(SignalDeliveryError::NoSuchProcess(_)) => {
                tracing::debug!(index, pid = %handle, "worker already gone")
            }
            Err(e) => tracing::warn!(index, pid = %handle, error = %e, "failed to signal worker"),
        }
    }

    fn announce(&mut self, index: WorkerIndex, handle: WorkerHandle) {
        if let Err(e) = self.announcer.publish(Announcement::new(index, handle)) {
            tracing::warn!(index, pid = %handle, error = %e, "failed to announce worker");
        }
    }

    /// Writes a protocol line to the supervisor output.
    fn say(&self, line: &str) {
        tracing::info!("{line}");
        if let Some(output) = &self.output {
            if let Err(e) = output.emit(line) {
                tracing::warn!(path = %output.path().display(), error = %e, "failed to write output");
            }
        }
    }
}
