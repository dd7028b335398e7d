use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use procwatch::{
    AnnouncementChannel, ExitOutcome, Launcher, SharedBuffer, SignalDeliveryError, SpawnError,
    SupervisorBuilder, SupervisorHandle, TerminationEvent, WorkerHandle, WorkerIndex,
};
use tokio::sync::mpsc;

pub const SUPERVISOR_PID: u32 = 900;

#[derive(Default)]
struct State {
    next_pid: u32,
    spawns: Vec<(WorkerIndex, WorkerHandle)>,
    kills: Vec<WorkerHandle>,
    attempts: Vec<WorkerHandle>,
    alive: HashSet<WorkerHandle>,
    failing: VecDeque<WorkerIndex>,
    events: Option<mpsc::UnboundedSender<TerminationEvent>>,
}

/// Launcher double that hands out increasing pids and plays the worker side:
/// a SIGTERM from the supervisor makes the "worker" exit with code 1.
#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    state: Arc<Mutex<State>>,
}

#[allow(unused)]
impl ScriptedLauncher {
    pub fn new() -> Self {
        let launcher = Self::default();
        launcher.state.lock().unwrap().next_pid = 1000;
        launcher
    }

    /// Makes the next spawn attempt for `index` fail.
    pub fn fail_next_spawn_of(&self, index: WorkerIndex) {
        self.state.lock().unwrap().failing.push_back(index);
    }

    pub fn spawns(&self) -> Vec<(WorkerIndex, WorkerHandle)> {
        self.state.lock().unwrap().spawns.clone()
    }

    pub fn kills(&self) -> Vec<WorkerHandle> {
        self.state.lock().unwrap().kills.clone()
    }

    /// Every handle passed to `terminate`, delivered or not.
    pub fn terminate_attempts(&self) -> Vec<WorkerHandle> {
        self.state.lock().unwrap().attempts.clone()
    }

    /// Pretends that the process `handle` terminated.
    pub fn exit(&self, handle: WorkerHandle, outcome: ExitOutcome) {
        let mut state = self.state.lock().unwrap();
        state.alive.remove(&handle);
        let events = state.events.clone().expect("no worker was spawned yet");
        events
            .send(TerminationEvent::new(handle, outcome))
            .expect("supervisor is gone");
    }

    /// Sends an event for a handle that was never spawned.
    pub fn exit_unknown(&self, raw: u32) {
        let state = self.state.lock().unwrap();
        let events = state.events.clone().expect("no worker was spawned yet");
        events
            .send(TerminationEvent::new(WorkerHandle::new(raw), ExitOutcome::Stopped))
            .expect("supervisor is gone");
    }
}

impl Launcher for ScriptedLauncher {
    fn spawn(
        &mut self,
        index: WorkerIndex,
        _supervisor: WorkerHandle,
        events: &mpsc::UnboundedSender<TerminationEvent>,
    ) -> Result<WorkerHandle, SpawnError> {
        let mut state = self.state.lock().unwrap();
        state.events.get_or_insert_with(|| events.clone());
        if state.failing.front() == Some(&index) {
            state.failing.pop_front();
            return Err(SpawnError::NoPid { index });
        }
        let handle = WorkerHandle::new(state.next_pid);
        state.next_pid += 1;
        state.spawns.push((index, handle));
        state.alive.insert(handle);
        Ok(handle)
    }

    fn terminate(&mut self, handle: WorkerHandle) -> Result<(), SignalDeliveryError> {
        let mut state = self.state.lock().unwrap();
        state.attempts.push(handle);
        if !state.alive.remove(&handle) {
            return Err(SignalDeliveryError::NoSuchProcess(handle));
        }
        state.kills.push(handle);
        if let Some(events) = &state.events {
            let _ = events.send(TerminationEvent::new(handle, ExitOutcome::MassRestart));
        }
        Ok(())
    }
}

/// Builder preset with a fixed supervisor identity and fast pacing.
pub fn builder(pool_size: usize) -> SupervisorBuilder {
    SupervisorBuilder::new()
        .with_pool_size(pool_size)
        .with_identity(WorkerHandle::new(SUPERVISOR_PID))
        .with_spawn_pacing(Duration::from_millis(10))
}

/// Starts a supervisor with `pool_size` scripted workers.
#[allow(unused)]
pub fn start(pool_size: usize) -> (SupervisorHandle, ScriptedLauncher, SharedBuffer) {
    let launcher = ScriptedLauncher::new();
    let announcements = SharedBuffer::new();
    let supervisor = builder(pool_size)
        .build(
            launcher.clone(),
            AnnouncementChannel::from_writer(announcements.clone()),
        )
        .unwrap();
    (supervisor.run(), launcher, announcements)
}

/// Announcements as `(index, pid)` pairs.
#[allow(unused)]
pub fn announced(buffer: &SharedBuffer) -> Vec<(WorkerIndex, u32)> {
    buffer
        .announcements()
        .into_iter()
        .map(|a| (a.index, a.handle.raw()))
        .collect()
}
