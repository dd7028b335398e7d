//! One-way announcement channel telling an external observer which process id
//! each worker index currently has.
//!
//! Frames are newline-delimited: `P<index> <handle>\n`.

use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::Path,
    str::FromStr,
    sync::{Arc, Mutex},
};

use nix::{errno::Errno, sys::stat::Mode, unistd::mkfifo};

use crate::supervisor::registry::{WorkerHandle, WorkerIndex};

#[derive(Debug, thiserror::Error)]
pub enum AnnounceError {
    #[error("failed to create fifo {path}: {source}")]
    CreateFifo { path: String, source: Errno },
    #[error("failed to open announcement channel {path}: {source}")]
    Open { path: String, source: io::Error },
    #[error("failed to publish P{index}: {source}")]
    Write { index: WorkerIndex, source: io::Error },
    #[error("malformed announcement: {0:?}")]
    Malformed(String),
}

/// A single `worker index -> handle` assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Announcement {
    pub index: WorkerIndex,
    pub handle: WorkerHandle,
}

impl Announcement {
    pub fn new(index: WorkerIndex, handle: WorkerHandle) -> Self {
        Self { index, handle }
    }

    /// Encodes the frame, including the trailing newline.
    pub fn to_line(&self) -> String {
        format!("P{} {}\n", self.index, self.handle)
    }
}

impl FromStr for Announcement {
    type Err = AnnounceError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let malformed = || AnnounceError::Malformed(line.to_string());
        let trimmed = line.trim_end_matches(['\n', '\r']);
        let (index, handle) = trimmed
            .strip_prefix('P')
            .and_then(|rest| rest.split_once(' '))
            .ok_or_else(malformed)?;
        Ok(Self {
            index: index.parse().map_err(|_| malformed())?,
            handle: WorkerHandle::new(handle.parse().map_err(|_| malformed())?),
        })
    }
}

/// Writes announcements in publish order.
pub struct AnnouncementChannel {
    sink: Box<dyn Write + Send>,
}

impl AnnouncementChannel {
    pub fn from_writer(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Box::new(sink),
        }
    }

    /// Opens the write end of a named pipe, creating it with mode 0644 if it
    /// does not exist yet. Blocks until a reader opens the other end.
    pub fn open_fifo(path: &Path) -> Result<Self, AnnounceError> {
        let display = path.display().to_string();
        match mkfifo(path, Mode::from_bits_truncate(0o644)) {
            Ok(()) | Err(Errno::EEXIST) => {}
            Err(source) => {
                return Err(AnnounceError::CreateFifo {
                    path: display,
                    source,
                })
            }
        }
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|source| AnnounceError::Open {
                path: display,
                source,
            })?;
        Ok(Self::from_writer(file))
    }

    /// Discards every announcement.
    pub fn sink() -> Self {
        Self::from_writer(io::sink())
    }

    pub fn publish(&mut self, announcement: Announcement) -> Result<(), AnnounceError> {
        let index = announcement.index;
        self.sink
            .write_all(announcement.to_line().as_bytes())
            .and_then(|()| self.sink.flush())
            .map_err(|source| AnnounceError::Write { index, source })
    }
}

impl std::fmt::Debug for AnnouncementChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnouncementChannel").finish_non_exhaustive()
    }
}

/// In-memory observer end, shareable between the channel and a reader.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses everything published so far.
    pub fn announcements(&self) -> Vec<Announcement> {
        let bytes = match self.0.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter_map(|line| line.parse().ok())
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .0
            .lock()
            .map_err(|_| io::Error::other("announcement buffer poisoned"))?;
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
