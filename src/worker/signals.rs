//! OS-level signal plumbing for worker processes.
//!
//! The installed callback only forwards `(signal, sender pid)` through a
//! self-pipe. Everything else happens in [`SignalListener::next`] on the
//! worker's main thread.

use std::{
    fs::File,
    io::{self, Read},
    os::fd::{AsRawFd, OwnedFd},
    sync::atomic::{AtomicI32, Ordering},
};

use nix::{
    libc,
    sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal},
    unistd::{pipe, Pid},
};

/// Signals a worker reacts to. SIGTERM is the only termination-class one.
pub const MONITORED_SIGNALS: [Signal; 8] = [
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGILL,
    Signal::SIGTRAP,
    Signal::SIGFPE,
    Signal::SIGSEGV,
    Signal::SIGTERM,
    Signal::SIGXCPU,
];

const RECORD_LEN: usize = 8;

/// Write end of the self-pipe, read by the signal callback.
static PIPE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

/// A signal as observed by the worker, with the process that sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalDelivery {
    pub signal: Signal,
    pub sender: Pid,
}

extern "C" fn forward_signal(signo: libc::c_int, info: *mut libc::siginfo_t, _: *mut libc::c_void) {
    let fd = PIPE_WRITE_FD.load(Ordering::Relaxed);
    if fd < 0 {
        return;
    }
    let sender = if info.is_null() {
        0
    } else {
        sender_pid(info)
    };
    let mut record = [0u8; RECORD_LEN];
    record[..4].copy_from_slice(&signo.to_ne_bytes());
    record[4..].copy_from_slice(&sender.to_ne_bytes());
    // write(2) is async-signal-safe and atomic for records below PIPE_BUF.
    unsafe {
        libc::write(fd, record.as_ptr().cast(), RECORD_LEN);
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn sender_pid(info: *mut libc::siginfo_t) -> libc::pid_t {
    unsafe { (*info).si_pid() }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn sender_pid(info: *mut libc::siginfo_t) -> libc::pid_t {
    unsafe { (*info).si_pid }
}

/// Receives monitored signals delivered to this process.
pub struct SignalListener {
    reader: File,
    _writer: OwnedFd,
}

impl SignalListener {
    /// Installs the forwarding callback for every signal in `signals`.
    ///
    /// Only one listener may be active per process.
    pub fn install(signals: &[Signal]) -> io::Result<Self> {
        let (read_fd, write_fd) = pipe().map_err(io::Error::from)?;
        PIPE_WRITE_FD.store(write_fd.as_raw_fd(), Ordering::Relaxed);

        let action = SigAction::new(
            SigHandler::SigAction(forward_signal),
            SaFlags::SA_SIGINFO | SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        for &signal in signals {
            // Safety: the handler only performs an atomic load and write(2).
            unsafe { sigaction(signal, &action) }.map_err(io::Error::from)?;
        }

        Ok(Self {
            reader: File::from(read_fd),
            _writer: write_fd,
        })
    }

    /// Blocks until the next signal arrives.
    pub fn next(&mut self) -> io::Result<SignalDelivery> {
        loop {
            let mut record = [0u8; RECORD_LEN];
            self.reader.read_exact(&mut record)?;

            let mut signo = [0u8; 4];
            let mut sender = [0u8; 4];
            signo.copy_from_slice(&record[..4]);
            sender.copy_from_slice(&record[4..]);

            match Signal::try_from(i32::from_ne_bytes(signo)) {
                Ok(signal) => {
                    return Ok(SignalDelivery {
                        signal,
                        sender: Pid::from_raw(i32::from_ne_bytes(sender)),
                    })
                }
                Err(e) => tracing::debug!(error = %e, "ignoring unknown signal number"),
            }
        }
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        PIPE_WRITE_FD.store(-1, Ordering::Relaxed);
    }
}
