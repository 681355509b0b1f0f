//! Device Tracker Error Hierarchy
//!
//! Errors are grouped by the layer that produces them: the view core, the
//! device registry that drives it, the persistence collaborator and the HTTP
//! request adapters. A membership predicate answering "no" is never an error.

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// View lock acquisition and lifecycle failures
    #[error(transparent)]
    View(#[from] ViewError),

    /// Registry bookkeeping failures (unknown views, duplicate ids, ...)
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Persistence collaborator failures
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Rejected bulk query parameters
    #[error(transparent)]
    Request(#[from] RequestError),

    /// JSON emission failures
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Blocking worker task panicked or was cancelled
    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::Storage(StorageError::SledError(e))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Storage(StorageError::BincodeError(e))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    /// The view lock could not be acquired in time; the operation was not applied
    #[error("Timed out acquiring lock on view {view} for {op}")]
    LockTimeout { view: String, op: &'static str },

    /// The view is draining or destroyed and admits no further operations
    #[error("View {0} is closed")]
    Closed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("View {0} already exists")]
    DuplicateView(String),

    #[error("View {0} not found")]
    ViewNotFound(String),

    #[error("Device {0} not found")]
    DeviceNotFound(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Statement preparation or binding failure; carries the rendered statement
    #[error("Failed to prepare statement: {statement} {message}")]
    Statement { statement: String, message: String },

    /// Result column index outside of the selected field list
    #[error("Column {index} out of range ({len} columns)")]
    ColumnOutOfRange { index: usize, len: usize },

    /// Result set has no column with this name
    #[error("No such result column: {0}")]
    UnknownColumn(String),

    /// Embedded database errors
    #[error(transparent)]
    SledError(#[from] sled::Error),

    /// Row encoding failures
    #[error(transparent)]
    BincodeError(#[from] bincode::Error),

    /// Disk I/O failures while opening the store
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Persisted row could not be converted back into a device record
    #[error("Value convert failed")]
    Convert(#[from] ConvertError),
}

/// Error type for value conversion operations
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Device key text is not `XXXXXXXX_XXXXXXXX`
    #[error("invalid device key: {0}")]
    InvalidDeviceKey(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Unknown sort column: {0}")]
    InvalidSortField(String),

    #[error("Unknown sort direction: {0}")]
    InvalidDirection(String),

    #[error("Requested page length {requested} exceeds maximum {max}")]
    PageTooLarge { requested: usize, max: usize },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
