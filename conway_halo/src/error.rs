// error.rs - Error types for configuration, image I/O and the worker protocol

use std::path::PathBuf;
use thiserror::Error;

pub type GolResult<T> = Result<T, GolError>;

#[derive(Debug, Error)]
pub enum GolError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Rejected parameters. Detected once, before any task is started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("at least one worker is required")]
    NoWorkers,
    #[error("grid must be at least 1x1, got {width}x{height}")]
    EmptyGrid { width: usize, height: usize },
    #[error("{threads} workers cannot share {height} rows, every worker needs at least one")]
    TooManyWorkers { threads: usize, height: usize },
    #[error("metrics interval must be non-zero")]
    ZeroInterval,
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image '{name}' not found")]
    NotFound { name: String },
    #[error("failed to access {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image '{name}' is malformed: {reason}")]
    Malformed { name: String, reason: String },
    #[error("image '{name}' is {actual_width}x{actual_height}, expected {width}x{height}")]
    DimensionMismatch {
        name: String,
        width: usize,
        height: usize,
        actual_width: usize,
        actual_height: usize,
    },
    #[error("image task has shut down")]
    Closed,
}

/// Broken ordering or a vanished peer. These are defects, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("worker {worker} stopped answering commands")]
    WorkerGone { worker: usize },
    #[error("worker {worker} lost its halo peer")]
    PeerGone { worker: usize },
    #[error("worker {worker} expected a halo from generation {expected}, got {actual}")]
    StaleHalo {
        worker: usize,
        expected: u64,
        actual: u64,
    },
    #[error("worker {worker} got a row of width {actual}, expected {expected}")]
    RowWidth {
        worker: usize,
        expected: usize,
        actual: usize,
    },
    #[error("worker {worker} needs at least 3 rows including halos, got {rows}")]
    BandShape { worker: usize, rows: usize },
    #[error("worker {worker} is at generation {actual}, expected {expected}")]
    OutOfStep {
        worker: usize,
        expected: u64,
        actual: u64,
    },
    #[error("worker {worker} never received its initial band")]
    NotInitialized { worker: usize },
}
