use std::collections::{HashMap, HashSet};

use nix::unistd::Pid;

/// Logical position of a worker in the pool. Index 0 is the supervisor itself.
pub type WorkerIndex = usize;

/// Runtime identity of a live worker instance (its process id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerHandle(u32);

impl WorkerHandle {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Handle of the calling process.
    pub fn current_process() -> Self {
        Self(std::process::id())
    }

    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// The process id to signal, or `None` if the value cannot name a single
    /// process (0 and anything above `i32::MAX` address process groups).
    pub fn as_pid(&self) -> Option<Pid> {
        i32::try_from(self.0)
            .ok()
            .filter(|raw| *raw > 0)
            .map(Pid::from_raw)
    }
}

impl From<u32> for WorkerHandle {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("handle {0} was never recorded")]
    UnknownHandle(WorkerHandle),
    #[error("index {index} is outside the pool (0..={pool_size})")]
    IndexOutOfRange {
        index: WorkerIndex,
        pool_size: usize,
    },
}

/// Bidirectional index <-> handle mapping owned by the supervisor.
///
/// Slots hold the current handle of every index. Handles that were replaced by
/// a restart stay resolvable so that late termination events of retired
/// instances can still be attributed, but they are never current again.
/// A current handle whose termination was already reaped is marked exited and
/// stays in its slot until the index is respawned.
#[derive(Debug, Clone)]
pub struct Registry {
    slots: Vec<Option<WorkerHandle>>,
    by_handle: HashMap<WorkerHandle, WorkerIndex>,
    exited: HashSet<WorkerHandle>,
}

impl Registry {
    /// Creates an empty registry for indices `0..=pool_size`.
    pub fn new(pool_size: usize) -> Self {
        Self {
            slots: vec![None; pool_size + 1],
            by_handle: HashMap::new(),
            exited: HashSet::new(),
        }
    }

    /// Number of ordinary workers (N).
    pub fn pool_size(&self) -> usize {
        self.slots.len() - 1
    }

    /// Sets the current handle for `index`, replacing any previous one.
    pub fn record(&mut self, index: WorkerIndex, handle: WorkerHandle) -> Result<(), LookupError> {
        let pool_size = self.pool_size();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(LookupError::IndexOutOfRange { index, pool_size })?;
        if let Some(previous) = slot.replace(handle) {
            self.exited.remove(&previous);
        }
        self.exited.remove(&handle);
        self.by_handle.insert(handle, index);
        Ok(())
    }

    /// Maps a handle back to the index it was recorded for.
    pub fn resolve(&self, handle: WorkerHandle) -> Result<WorkerIndex, LookupError> {
        self.by_handle
            .get(&handle)
            .copied()
            .ok_or(LookupError::UnknownHandle(handle))
    }

    pub fn current(&self, index: WorkerIndex) -> Option<WorkerHandle> {
        self.slots.get(index).copied().flatten()
    }

    /// True if `handle` is the live handle of the index it resolves to.
    pub fn is_current(&self, handle: WorkerHandle) -> bool {
        self.resolve(handle)
            .map(|index| self.current(index) == Some(handle))
            .unwrap_or(false)
    }

    /// Current `(index, handle)` pairs in index order.
    pub fn entries(&self) -> impl Iterator<Item = (WorkerIndex, WorkerHandle)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.map(|handle| (index, handle)))
    }

    /// Notes that the process behind a current handle is gone. Retired handles
    /// are ignored.
    pub fn mark_exited(&mut self, handle: WorkerHandle) {
        if self.is_current(handle) {
            self.exited.insert(handle);
        }
    }

    pub fn has_exited(&self, handle: WorkerHandle) -> bool {
        self.exited.contains(&handle)
    }

    /// Current entries whose process has not been reaped yet.
    pub fn live_entries(&self) -> impl Iterator<Item = (WorkerIndex, WorkerHandle)> + '_ {
        self.entries()
            .filter(|(_, handle)| !self.exited.contains(handle))
    }
}
