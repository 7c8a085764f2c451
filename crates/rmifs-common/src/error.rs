//! Error types for the file service
//!
//! `FsError` is the failure type of every file-service remote interface. It
//! carries the remote-call failure kind and round-trips through a wire
//! [`Fault`] without losing its kind or message.

use crate::path::{Path, PathError};
use rmifs_rmi::{Fault, FaultKind, RmiError, Transmissible};
use thiserror::Error;

/// Result type for file-service operations
pub type Result<T> = std::result::Result<T, FsError>;

const NOT_A_DIRECTORY: &str = "NotADirectory";

/// File-service failure
#[derive(Debug, Error)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("index out of bounds: {0}")]
    IndexOutOfBounds(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Rmi(#[from] RmiError),
}

impl FsError {
    /// Path does not exist
    pub fn not_found(path: &Path) -> Self {
        Self::NotFound(path.to_string())
    }

    pub fn already_exists(path: &Path) -> Self {
        Self::AlreadyExists(path.to_string())
    }

    pub fn not_a_directory(path: &Path) -> Self {
        Self::NotADirectory(path.to_string())
    }

    pub fn illegal_argument(msg: impl Into<String>) -> Self {
        Self::IllegalArgument(msg.into())
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    /// Check if this is a not-found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error is the remote-call failure kind
    #[must_use]
    pub const fn is_rmi(&self) -> bool {
        matches!(self, Self::Rmi(_))
    }
}

impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(e.to_string()),
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(e.to_string()),
            _ => Self::Io(e.to_string()),
        }
    }
}

impl From<PathError> for FsError {
    fn from(e: PathError) -> Self {
        Self::IllegalArgument(e.to_string())
    }
}

impl Transmissible for FsError {
    fn to_fault(&self) -> Fault {
        match self {
            Self::NotFound(msg) => Fault::new(FaultKind::NotFound, msg.clone()),
            Self::AlreadyExists(msg) => Fault::new(FaultKind::AlreadyExists, msg.clone()),
            Self::NotADirectory(msg) => {
                Fault::new(FaultKind::Application(NOT_A_DIRECTORY.into()), msg.clone())
            }
            Self::IllegalArgument(msg) => Fault::new(FaultKind::IllegalArgument, msg.clone()),
            Self::IllegalState(msg) => Fault::new(FaultKind::IllegalState, msg.clone()),
            Self::IndexOutOfBounds(msg) => Fault::new(FaultKind::IndexOutOfBounds, msg.clone()),
            Self::Io(msg) => Fault::new(FaultKind::Io, msg.clone()),
            Self::Rmi(e) => e.to_fault(),
        }
    }

    fn from_fault(fault: Fault) -> Self {
        match fault.kind {
            FaultKind::NotFound => Self::NotFound(fault.message),
            FaultKind::AlreadyExists => Self::AlreadyExists(fault.message),
            FaultKind::IllegalArgument => Self::IllegalArgument(fault.message),
            FaultKind::IllegalState => Self::IllegalState(fault.message),
            FaultKind::IndexOutOfBounds => Self::IndexOutOfBounds(fault.message),
            FaultKind::Io => Self::Io(fault.message),
            FaultKind::Application(ref tag) if tag == NOT_A_DIRECTORY => {
                Self::NotADirectory(fault.message)
            }
            _ => Self::Rmi(RmiError::from_fault(fault)),
        }
    }
}
