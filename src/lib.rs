//! # procwatch
//!
//! `procwatch` keeps a fixed pool of worker processes alive.
//!
//! The supervisor spawns workers `P1..PN`, announces every `P<index> <pid>`
//! assignment on a one-way channel and waits for workers to exit:
//!
//! * when the **privileged** worker (`P1` by default) dies, every other worker is
//!   sent `SIGTERM` and the whole pool is respawned;
//! * when any other worker stops, only that worker is respawned.
//!
//! Workers tell the supervisor how they died through their exit code. A worker
//! that receives `SIGTERM` from the supervisor exits with `1` (its death is
//! part of a full restart and must not be restarted twice), a `SIGTERM` from
//! anyone else makes it exit with `0`. Other monitored signals are only logged.
//!
//! ## Quick example
//!
//! ```rust,no_run
//! use procwatch::{AnnouncementChannel, OutputLog, ProcessLauncher, SupervisorBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let launcher = ProcessLauncher::new("./procwatch", "process_output");
//!     let supervisor = SupervisorBuilder::new()
//!         .with_pool_size(3)
//!         .with_worker_output(OutputLog::new("process_output"))
//!         .with_output(OutputLog::new("watchdog_output"))
//!         .build(launcher, AnnouncementChannel::open_fifo("/tmp/myfifo".as_ref())?)?;
//!
//!     let handle = supervisor.run();
//!     handle.wait().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## API overview
//!
//! | SupervisorHandle method | Purpose                                         |
//! | ----------------------- | ----------------------------------------------- |
//! | `workers().await`       | Current `(index, handle)` pairs                 |
//! | `shutdown()`            | Stop supervising, leave the workers running     |
//! | `wait().await`          | Wait for the supervisor to stop                 |

pub use announce::{AnnounceError, Announcement, AnnouncementChannel, SharedBuffer};
pub use messaging::{ExitOutcome, TerminationEvent, EXIT_MASS_RESTART, EXIT_STOPPED};
pub use output::OutputLog;
pub use supervisor::{
    builder::SupervisorBuilder,
    handle::{SupervisorHandle, SupervisorHandleError},
    launcher::{send_terminate, Launcher, ProcessLauncher, SignalDeliveryError, SpawnError},
    registry::{LookupError, Registry, WorkerHandle, WorkerIndex},
    Decision, Supervisor, SupervisorError, SUPERVISOR_INDEX,
};
pub use worker::{classify, Reaction, SignalDelivery, Worker, WorkerError, MONITORED_SIGNALS};

mod announce;
pub mod logging;
mod messaging;
pub mod os_signals;
mod output;
mod supervisor;
mod worker;
