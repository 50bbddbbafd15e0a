//! Error types for fmcore
//!
//! Every failing file operation produces a [`FileOperationError`] carrying the
//! path involved; [`FileOperationError::code`] collapses it into the flat
//! [`ResultCode`] the surrounding application switches on.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::TransferMode;

/// Flat outcome of a file operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// The operation succeeded
    Ok,
    /// Source object does not exist
    NotFound,
    /// Destination already exists
    AlreadyExists,
    /// Permission denied on source or destination
    PermissionDenied,
    /// Destination volume is out of space
    DiskFull,
    /// Any other I/O failure
    IoError,
    /// The operation was cancelled
    Cancelled,
    /// Bad argument (zero chunk size, wrong object type, ...)
    InvalidArgument,
    /// A chunk call used the wrong entry point for the open session
    ModeMismatch,
}

impl ResultCode {
    /// Whether this code denotes success
    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }
}

/// Error type for transfer and file-object operations
#[derive(Error, Debug)]
pub enum FileOperationError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File or directory not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// Destination already exists
    #[error("Destination already exists: {0}")]
    AlreadyExists(PathBuf),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Disk full
    #[error("Insufficient disk space at '{path}': need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        path: PathBuf,
        required: u64,
        available: u64,
    },

    /// Disk full reported by the OS mid-write
    #[error("No space left on device: {0}")]
    DiskFull(PathBuf),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Chunk call does not match the mode of the open session
    #[error("A {open} is already in progress; cannot continue it as a {requested}")]
    ModeMismatch {
        open: TransferMode,
        requested: TransferMode,
    },

    /// Transfer abandoned through `cancel_copy`
    ///
    /// Recorded as the engine's last error when an open session is
    /// cancelled; callers that stop a transfer early report it as
    /// [`ResultCode::Cancelled`].
    #[error("Operation cancelled")]
    Cancelled,
}

impl FileOperationError {
    /// Create an I/O error with path context, classifying well-known kinds
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(path),
            _ if is_out_of_space(&source) => Self::DiskFull(path),
            _ => Self::Io { path, source },
        }
    }

    /// Create an invalid argument error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Map to the flat result code
    pub fn code(&self) -> ResultCode {
        match self {
            Self::Io { .. } => ResultCode::IoError,
            Self::NotFound(_) => ResultCode::NotFound,
            Self::AlreadyExists(_) => ResultCode::AlreadyExists,
            Self::PermissionDenied(_) => ResultCode::PermissionDenied,
            Self::InsufficientSpace { .. } | Self::DiskFull(_) => ResultCode::DiskFull,
            Self::InvalidArgument(_) => ResultCode::InvalidArgument,
            Self::ModeMismatch { .. } => ResultCode::ModeMismatch,
            Self::Cancelled => ResultCode::Cancelled,
        }
    }

    /// Check if this error is transient (the failed step can be retried)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. }
            | Self::NotFound(path)
            | Self::AlreadyExists(path)
            | Self::PermissionDenied(path)
            | Self::InsufficientSpace { path, .. }
            | Self::DiskFull(path) => Some(path),
            _ => None,
        }
    }
}

#[cfg(unix)]
fn is_out_of_space(err: &std::io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::ENOSPC) | Some(libc::EDQUOT))
}

#[cfg(not(unix))]
fn is_out_of_space(_err: &std::io::Error) -> bool {
    false
}

/// Result type alias for file operations
pub type Result<T> = std::result::Result<T, FileOperationError>;

/// Collapse an operation result into its result code
pub fn result_code<T>(result: &Result<T>) -> ResultCode {
    match result {
        Ok(_) => ResultCode::Ok,
        Err(e) => e.code(),
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| FileOperationError::io(path, e))
    }
}
