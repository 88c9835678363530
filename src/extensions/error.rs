//! Error types for the extension system.

use std::path::PathBuf;
use thiserror::Error;

use super::storage::StoreError;

/// Why a chosen directory was rejected as an extension bundle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleProblem {
    #[error("{0} is not a readable directory")]
    NotADirectory(PathBuf),

    #[error("no .json manifest found")]
    MissingManifest,

    #[error("no .html entry document found")]
    MissingEntryDocument,

    #[error("more than one .json manifest candidate: {}", .0.join(", "))]
    AmbiguousManifest(Vec<String>),

    #[error("manifest {path} is invalid: {message}")]
    InvalidManifest { path: PathBuf, message: String },

    #[error("cannot derive a directory name from {0}")]
    UnnamedDirectory(PathBuf),
}

/// Errors that can occur in the extension system.
#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("Invalid extension bundle: {0}")]
    InvalidBundle(BundleProblem),

    #[error("Extension '{0}' is already registered")]
    DuplicateName(String),

    #[error("Directory '{directory}' already belongs to extension '{owner}'")]
    DirectoryInUse { directory: String, owner: String },

    #[error("Extension '{0}' not found")]
    ExtensionNotFound(String),

    #[error("Extension '{name}' is unavailable: {fault}")]
    ConsistencyFault { name: String, fault: ConsistencyFault },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Filesystem error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExtensionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<BundleProblem> for ExtensionError {
    fn from(problem: BundleProblem) -> Self {
        Self::InvalidBundle(problem)
    }
}

/// A broken link between the persisted sets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyFault {
    #[error("registered manifest has no managed directory")]
    MissingDirectory,

    #[error("managed directory '{0}' has no registered manifest")]
    OrphanedDirectory(String),

    #[error("activation record has no registered manifest")]
    OrphanedActivation,
}

/// Result type for extension operations.
pub type ExtensionResult<T> = Result<T, ExtensionError>;
