//! Error types for Scorch

use thiserror::Error;

use crate::types::{Phase, StorePath};

/// Errors raised by a [`GraphStore`](crate::store::GraphStore) implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store (or the subtree being read) cannot be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A single write was refused synchronously
    #[error("Write rejected at {path}: {reason}")]
    WriteRejected { path: StorePath, reason: String },

    /// A low-level cache/on-disk clear hook failed
    #[error("Internal clear failed: {0}")]
    ClearFailed(String),
}

/// Result type alias using StoreError
pub type StoreResult<T> = Result<T, StoreError>;

/// Main error type for purge operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PurgeError {
    /// A destructive run is already in progress; nothing was written
    #[error("A destruction run is already in progress")]
    AlreadyRunning,

    /// An unexpected error escaped a phase; later phases were skipped
    #[error("Phase {phase} failed: {source}")]
    PhaseFailure {
        phase: Phase,
        #[source]
        source: Box<PurgeError>,
    },

    /// The store refused a read or hook at phase level
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A blocking tombstone worker panicked or was aborted
    #[error("Tombstone worker failed: {0}")]
    Worker(String),

    /// The run was cancelled between phases
    #[error("Run cancelled before phase {0}")]
    Cancelled(Phase),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// General I/O error (config loading)
    #[error("IO error: {0}")]
    Io(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for PurgeError {
    fn from(err: std::io::Error) -> Self {
        PurgeError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PurgeError {
    fn from(err: serde_json::Error) -> Self {
        PurgeError::Serialization(err.to_string())
    }
}

impl PurgeError {
    /// Wrap `self` as the failure of `phase`, unless it already is one.
    pub fn in_phase(self, phase: Phase) -> Self {
        match self {
            err @ PurgeError::PhaseFailure { .. } => err,
            other => PurgeError::PhaseFailure {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// The error underneath any phase wrapper
    pub fn root_cause(&self) -> &PurgeError {
        match self {
            PurgeError::PhaseFailure { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type alias using PurgeError
pub type PurgeResult<T> = Result<T, PurgeError>;
