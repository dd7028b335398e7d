use tokio::{
    sync::{mpsc, oneshot},
    task::{JoinError, JoinHandle},
};

use crate::{
    messaging::SupervisorMessage,
    supervisor::{
        registry::{WorkerHandle, WorkerIndex},
        SupervisorError,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum SupervisorHandleError {
    #[error("supervisor is no longer running")]
    Closed,
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error("supervisor task panicked or was cancelled: {0}")]
    Join(#[from] JoinError),
}

/// Controls a running `Supervisor`.
#[derive(Debug)]
pub struct SupervisorHandle {
    join_handle: JoinHandle<Result<(), SupervisorError>>,
    tx: mpsc::UnboundedSender<SupervisorMessage>,
}

impl SupervisorHandle {
    pub(crate) fn new(
        join_handle: JoinHandle<Result<(), SupervisorError>>,
        tx: mpsc::UnboundedSender<SupervisorMessage>,
    ) -> Self {
        Self { join_handle, tx }
    }

    /// Current `(index, handle)` pairs, index 0 first.
    ///
    /// Answered once the initial pool is up and every termination event queued
    /// before this call has been handled.
    pub async fn workers(&self) -> Result<Vec<(WorkerIndex, WorkerHandle)>, SupervisorHandleError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SupervisorMessage::Workers(reply_tx))
            .map_err(|_| SupervisorHandleError::Closed)?;
        reply_rx.await.map_err(|_| SupervisorHandleError::Closed)
    }

    /// Stops the event loop. Workers keep running.
    pub fn shutdown(&self) -> Result<(), SupervisorHandleError> {
        self.tx
            .send(SupervisorMessage::Shutdown)
            .map_err(|_| SupervisorHandleError::Closed)
    }

    /// Waits for the supervisor to stop, returning the error that stopped it, if any.
    pub async fn wait(self) -> Result<(), SupervisorHandleError> {
        self.join_handle.await??;
        Ok(())
    }
}
