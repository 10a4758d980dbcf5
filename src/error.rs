use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Precondition failures of the page table store and the free frame list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("invalid dimensions: {processes} processes x {pages} pages")]
    InvalidDimensions { processes: usize, pages: usize },

    #[error("free frame list needs at least one frame")]
    NoFrames,

    #[error("process {pid} out of range ({processes} processes)")]
    UnknownProcess { pid: usize, processes: usize },

    #[error("page {page} out of range for a table of {pages} entries")]
    PageOutOfRange { page: usize, pages: usize },

    #[error("page {page} of process {pid} is not resident")]
    NotResident { pid: usize, page: usize },

    #[error("frame {frame} outside pool of {frames} frames")]
    FrameOutOfRange { frame: usize, frames: usize },

    #[error("free frame list already full, cannot release frame {frame}")]
    PoolFull { frame: usize },

    #[error("frame {frame} is already free")]
    DoubleFree { frame: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{what} must be positive")]
    NonPositive { what: &'static str },

    #[error("illegal reference rate {0} outside [0, 1]")]
    IllegalRate(f64),

    #[error("timeout must be non-zero")]
    ZeroTimeout,

    #[error("reference file has no processes")]
    EmptyReferences,

    #[error("expected {expected} workloads, got {got}")]
    WorkloadCount { expected: usize, got: usize },

    #[error("workload {index} has pid {pid}, pids must be 0..k in order")]
    WorkloadPid { index: usize, pid: usize },
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("internal invariant violated: {0}")]
    Memory(#[from] MemoryError),

    #[error("frame {frame} mapped to process {pid} page {page} is already owned by process {owner_pid} page {owner_page}")]
    FrameAlreadyOwned {
        frame: usize,
        pid: usize,
        page: usize,
        owner_pid: usize,
        owner_page: usize,
    },

    #[error("frame accounting broken: {0}")]
    Accounting(String),

    #[error("{0} channel disconnected")]
    Disconnected(&'static str),

    #[error("timed out after {after:?} waiting for {waiting_for}")]
    Timeout {
        waiting_for: &'static str,
        after: Duration,
    },

    #[error("failed to spawn thread")]
    Spawn(#[source] io::Error),

    #[error("{0} thread panicked")]
    ThreadPanicked(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line {line}: invalid integer {token:?}")]
    Parse { line: usize, token: String },
}

pub type Result<T> = std::result::Result<T, SimError>;
