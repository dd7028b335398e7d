use std::time::Duration;

use tokio::sync::mpsc;

use crate::{
    announce::AnnouncementChannel,
    output::OutputLog,
    supervisor::{
        launcher::Launcher,
        registry::{Registry, WorkerHandle, WorkerIndex},
        Supervisor, SupervisorError,
    },
};

/// Builds a `Supervisor` instance with configurable parameters.
///
/// Defaults: one worker, index 1 privileged, 300 ms between initial spawns,
/// the calling process as supervisor identity and no output files.
pub struct SupervisorBuilder {
    pool_size: usize,
    privileged: WorkerIndex,
    spawn_pacing: Duration,
    identity: Option<WorkerHandle>,
    output: Option<OutputLog>,
    worker_output: Option<OutputLog>,
}

impl SupervisorBuilder {
    /// Creates a new builder with default configuration values.
    pub fn new() -> Self {
        Self {
            pool_size: 1,
            privileged: 1,
            spawn_pacing: Duration::from_millis(300),
            identity: None,
            output: None,
            worker_output: None,
        }
    }

    /// Sets the number of workers (N), not counting the supervisor.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Sets the worker whose death restarts the whole pool.
    pub fn with_privileged_index(mut self, index: WorkerIndex) -> Self {
        self.privileged = index;
        self
    }

    /// Sets the delay between spawns of the initial pool.
    pub fn with_spawn_pacing(mut self, delay: Duration) -> Self {
        self.spawn_pacing = delay;
        self
    }

    /// Overrides the identity recorded as index 0 and passed to workers.
    pub fn with_identity(mut self, identity: WorkerHandle) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Sets the file the supervisor writes its protocol lines to.
    pub fn with_output(mut self, output: OutputLog) -> Self {
        self.output = Some(output);
        self
    }

    /// Sets the file shared by the workers; it is emptied before the pool starts.
    pub fn with_worker_output(mut self, output: OutputLog) -> Self {
        self.worker_output = Some(output);
        self
    }

    /// Constructs the `Supervisor` with the configured settings.
    pub fn build<L: Launcher>(
        self,
        launcher: L,
        announcer: AnnouncementChannel,
    ) -> Result<Supervisor<L>, SupervisorError> {
        if self.pool_size == 0 {
            return Err(SupervisorError::EmptyPool);
        }
        if !(1..=self.pool_size).contains(&self.privileged) {
            return Err(SupervisorError::InvalidPrivilegedIndex {
                index: self.privileged,
                pool_size: self.pool_size,
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (external_tx, external_rx) = mpsc::unbounded_channel();
        Ok(Supervisor {
            launcher,
            registry: Registry::new(self.pool_size),
            announcer,
            output: self.output,
            worker_output: self.worker_output,
            identity: self.identity.unwrap_or_else(WorkerHandle::current_process),
            privileged: self.privileged,
            spawn_pacing: self.spawn_pacing,
            tx,
            rx,
            external_tx,
            external_rx,
        })
    }
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
