use crate::sheets::{Key, TransportError};
use crate::worker::WorkerError;

/// Error type for table store operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The remote call failed. Not retried here; the caller decides.
    RemoteUnavailable(TransportError),
    /// Update of a key that is not in the table
    RecordNotFound { table: String, key: Key },
    /// The caller broke an operation's contract
    InvalidArgument(String),
    /// The serial worker is gone
    WorkerUnavailable(WorkerError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::RemoteUnavailable(e) => write!(f, "remote store unavailable: {}", e),
            StoreError::RecordNotFound { table, key } => {
                write!(f, "no row was found in {} with {}", table, key)
            }
            StoreError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            StoreError::WorkerUnavailable(e) => write!(f, "store worker: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::RemoteUnavailable(e) => Some(e),
            StoreError::WorkerUnavailable(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for StoreError {
    fn from(e: TransportError) -> Self {
        StoreError::RemoteUnavailable(e)
    }
}

impl From<WorkerError> for StoreError {
    fn from(e: WorkerError) -> Self {
        StoreError::WorkerUnavailable(e)
    }
}
