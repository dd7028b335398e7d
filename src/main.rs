//! procwatch - process pool watchdog.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use procwatch::{
    logging, os_signals::TerminationSignals, AnnouncementChannel, OutputLog, ProcessLauncher,
    SupervisorBuilder, Worker, WorkerHandle, WorkerIndex,
};

/// Keeps a pool of worker processes alive and restarts them when they die.
#[derive(Parser, Debug)]
#[command(name = "procwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the supervisor and its worker pool.
    Supervise(SuperviseArgs),
    /// Run a single worker (spawned by the supervisor).
    Worker(WorkerArgs),
}

#[derive(Args, Debug)]
struct SuperviseArgs {
    /// Number of workers, not counting the supervisor.
    pool_size: usize,

    /// File shared by all workers.
    worker_output: PathBuf,

    /// File the supervisor writes its own lines to.
    supervisor_output: PathBuf,

    /// Named pipe the `P<index> <pid>` announcements are written to.
    #[arg(long, env = "PROCWATCH_FIFO", default_value = "/tmp/myfifo")]
    fifo: PathBuf,

    /// Do not announce anything.
    #[arg(long, conflicts_with = "fifo")]
    no_announce: bool,

    /// Worker whose death restarts the whole pool.
    #[arg(long, default_value_t = 1)]
    privileged: WorkerIndex,

    /// Delay between spawns of the initial pool, in milliseconds.
    #[arg(long, default_value_t = 300)]
    pacing_ms: u64,

    /// Program to run as worker (defaults to this executable).
    #[arg(long)]
    worker_program: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct WorkerArgs {
    /// Shared output file.
    #[arg(long)]
    output: PathBuf,

    /// Index of this worker in the pool.
    #[arg(long)]
    index: WorkerIndex,

    /// Process id of the supervisor.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=i64::from(i32::MAX)))]
    supervisor: u32,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(logging::level_for(cli.verbose, cli.quiet));

    match cli.command {
        Commands::Supervise(args) => cmd_supervise(args),
        Commands::Worker(args) => cmd_worker(args),
    }
}

fn cmd_worker(args: WorkerArgs) -> Result<()> {
    let supervisor = WorkerHandle::new(args.supervisor)
        .as_pid()
        .with_context(|| format!("invalid supervisor pid {}", args.supervisor))?;
    let worker = Worker::new(args.index, supervisor, OutputLog::new(args.output));
    let code = worker.run()?;
    std::process::exit(code)
}

fn cmd_supervise(args: SuperviseArgs) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    let result = runtime.block_on(supervise(args));
    // A FIFO open still waiting for a reader must not keep the process alive.
    runtime.shutdown_background();
    result
}

async fn supervise(args: SuperviseArgs) -> Result<()> {
    let mut signals = TerminationSignals::register().context("failed to register signals")?;

    let program = match args.worker_program {
        Some(program) => program,
        None => std::env::current_exe().context("failed to locate current executable")?,
    };
    let output = OutputLog::new(&args.supervisor_output);

    let announcer = if args.no_announce {
        AnnouncementChannel::sink()
    } else {
        let fifo = args.fifo.clone();
        tracing::info!(fifo = %fifo.display(), "waiting for announcement reader");
        let open = tokio::task::spawn_blocking(move || AnnouncementChannel::open_fifo(&fifo));
        tokio::select! {
            () = signals.recv() => return terminate(&output),
            res = open => res.context("announcement channel task failed")??,
        }
    };

    let supervisor = SupervisorBuilder::new()
        .with_pool_size(args.pool_size)
        .with_privileged_index(args.privileged)
        .with_spawn_pacing(Duration::from_millis(args.pacing_ms))
        .with_output(output.clone())
        .with_worker_output(OutputLog::new(&args.worker_output))
        .build(
            ProcessLauncher::new(program, &args.worker_output),
            announcer,
        )?;

    let handle = supervisor.run();
    tokio::select! {
        () = signals.recv() => terminate(&output),
        res = handle.wait() => res.context("supervisor stopped"),
    }
}

/// Graceful exit on SIGTERM/SIGINT. Workers are left running.
fn terminate(output: &OutputLog) -> Result<()> {
    tracing::info!("supervisor terminating");
    output
        .emit("Supervisor is terminating gracefully")
        .context("failed to write supervisor output")
}
