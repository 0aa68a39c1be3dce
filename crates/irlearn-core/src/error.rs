//! Error types
//!
//! Every failure in this crate is locally recoverable. Operations return
//! `IrResult<T>` and the caller decides whether to retry, report or ignore;
//! nothing here panics or unwinds past the control loop.

use thiserror::Error;

/// Result type for irlearn operations
pub type IrResult<T> = Result<T, IrError>;

/// Errors that can occur while learning, storing or transmitting signals
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IrError {
    /// Bad id, empty timing sequence, zero carrier, oversized input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Every slot in the store holds a valid record
    #[error("Signal store is full ({capacity} slots)")]
    StoreFull { capacity: usize },

    /// Id refers to no valid record (or a checked handle went stale)
    #[error("Signal {0} not found")]
    NotFound(usize),

    /// Learning session ended below the minimum sample count
    #[error("Insufficient samples: collected {collected}, need at least {required}")]
    InsufficientSamples { collected: usize, required: usize },

    /// All transmit attempts on every available path were exhausted
    #[error("Transmit failed after {attempts} attempt(s)")]
    TransmitFailed { attempts: u32 },

    /// Persisted image failed validation (marker, count or record layout)
    #[error("Persisted image corrupt: {0}")]
    PersistenceCorrupt(String),

    /// Non-volatile storage backend failed to read or commit
    #[error("Storage error: {0}")]
    Storage(String),

    /// Peripheral reported a failure (generator busy, timeout, driver error)
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// No encoder is available for the requested protocol
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse error classification, the reason code reported to the command layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    StoreFull,
    NotFound,
    InsufficientSamples,
    TransmitFailed,
    PersistenceCorrupt,
    Storage,
    Hardware,
    Unsupported,
    Config,
}

impl IrError {
    /// Reason code for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            IrError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            IrError::StoreFull { .. } => ErrorKind::StoreFull,
            IrError::NotFound(_) => ErrorKind::NotFound,
            IrError::InsufficientSamples { .. } => ErrorKind::InsufficientSamples,
            IrError::TransmitFailed { .. } => ErrorKind::TransmitFailed,
            IrError::PersistenceCorrupt(_) => ErrorKind::PersistenceCorrupt,
            IrError::Storage(_) => ErrorKind::Storage,
            IrError::Hardware(_) => ErrorKind::Hardware,
            IrError::Unsupported(_) => ErrorKind::Unsupported,
            IrError::Config(_) => ErrorKind::Config,
        }
    }

    /// Check if retrying the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IrError::Hardware(_) | IrError::Storage(_) | IrError::TransmitFailed { .. }
        )
    }

    /// Shorthand for an `InvalidArgument` error
    pub fn invalid(msg: impl Into<String>) -> Self {
        IrError::InvalidArgument(msg.into())
    }
}

impl From<std::io::Error> for IrError {
    fn from(err: std::io::Error) -> Self {
        IrError::Storage(err.to_string())
    }
}
