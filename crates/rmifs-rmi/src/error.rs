//! Error types for the RMI substrate
//!
//! `RmiError` is the remote-call failure kind: every method of a remote
//! interface must be able to report it. `Fault` is the transmissible form of
//! a failure, written into a response frame and re-raised on the caller side.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for RMI substrate operations
pub type Result<T> = std::result::Result<T, RmiError>;

/// Remote-call failure
#[derive(Debug, Error)]
pub enum RmiError {
    // Construction errors
    #[error("{interface} is not a remote interface")]
    NotRemoteInterface { interface: String },

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // Transport errors
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    // Failures reported by the remote skeleton
    #[error("remote failure: {0}")]
    Remote(Fault),
}

impl RmiError {
    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an illegal state error
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    /// Check if this error was raised while constructing a stub or skeleton
    #[must_use]
    pub const fn is_construction(&self) -> bool {
        matches!(
            self,
            Self::NotRemoteInterface { .. } | Self::IllegalState(_) | Self::InvalidArgument(_)
        )
    }

    /// Check if this error came from the network rather than the peer
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<bincode::Error> for RmiError {
    fn from(e: bincode::Error) -> Self {
        Self::Protocol(format!("bincode: {e}"))
    }
}

impl From<&RmiError> for Fault {
    fn from(e: &RmiError) -> Self {
        match e {
            RmiError::Remote(fault) => fault.clone(),
            RmiError::Protocol(msg) => Self::new(FaultKind::Protocol, msg.clone()),
            RmiError::IllegalState(msg) => Self::new(FaultKind::IllegalState, msg.clone()),
            RmiError::InvalidArgument(msg) => Self::new(FaultKind::IllegalArgument, msg.clone()),
            other => Self::new(FaultKind::Remote, other.to_string()),
        }
    }
}

/// Kind of a transmitted failure
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    /// A remote call made by the server itself failed
    Remote,
    /// The request named an interface the skeleton does not serve
    InterfaceMismatch,
    /// No method with the requested name and arity exists
    MethodNotFound,
    /// The request could not be decoded
    Protocol,
    NotFound,
    AlreadyExists,
    IllegalArgument,
    IllegalState,
    IndexOutOfBounds,
    Io,
    /// Interface-specific failure, tagged by name
    Application(String),
}

impl FaultKind {
    /// Faults produced by the substrate rather than by the invoked method
    #[must_use]
    pub const fn is_substrate(&self) -> bool {
        matches!(
            self,
            Self::Remote | Self::InterfaceMismatch | Self::MethodNotFound | Self::Protocol
        )
    }
}

/// Failure description carried by a response frame
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Error type usable as the failure of a remote interface method.
///
/// Implementors can carry [`RmiError`] (so transport faults surface as the
/// remote-call failure kind) and round-trip through [`Fault`] without losing
/// their kind.
pub trait Transmissible: From<RmiError> + Send + 'static {
    /// Describe this error for transmission
    fn to_fault(&self) -> Fault;

    /// Rebuild the error on the caller side
    fn from_fault(fault: Fault) -> Self;
}

impl Transmissible for RmiError {
    fn to_fault(&self) -> Fault {
        Fault::from(self)
    }

    fn from_fault(fault: Fault) -> Self {
        match fault.kind {
            FaultKind::Protocol => Self::Protocol(fault.message),
            FaultKind::IllegalState => Self::IllegalState(fault.message),
            FaultKind::IllegalArgument => Self::InvalidArgument(fault.message),
            _ => Self::Remote(fault),
        }
    }
}
