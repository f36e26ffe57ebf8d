//! Error types and status codes for transform jobs.
//!
//! Every failure a job can hit is a [`TransformError`]. External callers that
//! only understand integers (the C ABI, an HTTP layer) receive a [`StatusCode`]:
//! `0` on success, a negated Linux errno otherwise, plus an optional message.
//!
//! # Status codes
//!
//! | Error                 | Code   |
//! |-----------------------|--------|
//! | `NotFound`            | `-2`   |
//! | `PermissionDenied`    | `-13`  |
//! | `EmptyOrInvalid`      | `-22`  |
//! | `InvalidThreadCount`  | `-22`  |
//! | `ShortRead`           | `-5`   |
//! | `ShortWrite`          | `-5`   |
//! | `Io`                  | raw OS errno negated, else `-5` |
//! | `OutOfMemory`         | `-12`  |
//! | `TooLarge`            | `-12`  |
//! | `SpawnFailure`        | `-11`  |
//! | `WorkerPanicked`      | `-5`   |

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, TransformError>;

/// Linux errno values used for status codes
pub mod errno {
    /// No such file or directory
    pub const ENOENT: i32 = 2;
    /// I/O error
    pub const EIO: i32 = 5;
    /// Resource temporarily unavailable
    pub const EAGAIN: i32 = 11;
    /// Out of memory
    pub const ENOMEM: i32 = 12;
    /// Permission denied
    pub const EACCES: i32 = 13;
    /// Bad address
    pub const EFAULT: i32 = 14;
    /// Invalid argument
    pub const EINVAL: i32 = 22;
}

/// Transform job errors
#[derive(Debug, Error)]
pub enum TransformError {
    /// A file could not be opened because it does not exist
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A file could not be opened due to insufficient privileges
    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    /// Zero-length key or payload
    #[error("{what} is empty or invalid: {detail}")]
    EmptyOrInvalid {
        /// Which input was rejected ("key", "input", "payload")
        what: &'static str,
        /// Path or reason
        detail: String,
    },

    /// Thread count below 1
    #[error("invalid thread count: {0} (must be at least 1)")]
    InvalidThreadCount(usize),

    /// Fewer bytes were read than the file size announced
    #[error("short read on {}: expected {expected} bytes, got {actual}", path.display())]
    ShortRead {
        /// File being read
        path: PathBuf,
        /// Bytes requested
        expected: u64,
        /// Bytes actually read
        actual: u64,
    },

    /// Fewer bytes were written than requested
    #[error("short write on {}: expected {expected} bytes, wrote {actual}", path.display())]
    ShortWrite {
        /// File being written
        path: PathBuf,
        /// Bytes requested
        expected: u64,
        /// Bytes actually written
        actual: u64,
    },

    /// Any other I/O failure
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Buffer allocation failed
    #[error("out of memory allocating {requested} bytes")]
    OutOfMemory {
        /// Bytes requested
        requested: u64,
    },

    /// File exceeds the configured buffer limit
    #[error("{} is too large: {size} bytes exceeds limit of {limit}", path.display())]
    TooLarge {
        /// File being loaded
        path: PathBuf,
        /// File size
        size: u64,
        /// Configured limit
        limit: u64,
    },

    /// The OS refused to start a worker thread
    #[error("failed to spawn worker {index}: {source}")]
    SpawnFailure {
        /// Fragment index of the worker that failed to start
        index: usize,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// A worker terminated without signaling completion
    #[error("worker {index} terminated without signaling completion")]
    WorkerPanicked {
        /// Fragment index of the failed worker
        index: usize,
    },
}

impl TransformError {
    /// Classify an I/O error raised while opening or accessing `path`
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// Negative errno-style status code for this error
    #[must_use]
    pub fn status_code(&self) -> i32 {
        match self {
            Self::NotFound(_) => -errno::ENOENT,
            Self::PermissionDenied(_) => -errno::EACCES,
            Self::EmptyOrInvalid { .. } | Self::InvalidThreadCount(_) => -errno::EINVAL,
            Self::ShortRead { .. } | Self::ShortWrite { .. } | Self::WorkerPanicked { .. } => {
                -errno::EIO
            }
            Self::Io { source, .. } => match source.raw_os_error() {
                Some(code) if code > 0 => -code,
                _ => -errno::EIO,
            },
            Self::OutOfMemory { .. } | Self::TooLarge { .. } => -errno::ENOMEM,
            Self::SpawnFailure { .. } => -errno::EAGAIN,
        }
    }
}

/// Outcome of a job as seen by integer-only callers
///
/// `code` is `0` on success and negative otherwise. The message carries the
/// rendered error and is `None` on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCode {
    code: i32,
    message: Option<String>,
}

impl StatusCode {
    /// Successful completion
    #[must_use]
    pub fn success() -> Self {
        Self {
            code: 0,
            message: None,
        }
    }

    /// Failure with an explicit code and message
    ///
    /// Non-negative codes are forced to `-EIO` so a failure can never read as
    /// success.
    #[must_use]
    pub fn failure(code: i32, message: impl Into<String>) -> Self {
        let code = if code < 0 { code } else { -errno::EIO };
        Self {
            code,
            message: Some(message.into()),
        }
    }

    /// Raw integer status
    #[must_use]
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Diagnostic message, if any
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Whether the job succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

impl From<&TransformError> for StatusCode {
    fn from(err: &TransformError) -> Self {
        Self::failure(err.status_code(), err.to_string())
    }
}

impl<T> From<&Result<T>> for StatusCode {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::success(),
            Err(err) => err.into(),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            None => write!(f, "{} (success)", self.code),
            Some(msg) => write!(f, "{}: {}", self.code, msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_classification() {
        let path = Path::new("/tmp/missing");

        let err = TransformError::from_io(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, TransformError::NotFound(_)));

        let err = TransformError::from_io(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, TransformError::PermissionDenied(_)));

        let err = TransformError::from_io(path, io::Error::other("disk on fire"));
        assert!(matches!(err, TransformError::Io { .. }));
    }

    #[test]
    fn test_status_codes() {
        let p = PathBuf::from("/x");
        assert_eq!(TransformError::NotFound(p.clone()).status_code(), -2);
        assert_eq!(TransformError::PermissionDenied(p.clone()).status_code(), -13);
        assert_eq!(
            TransformError::EmptyOrInvalid {
                what: "key",
                detail: "/x".into()
            }
            .status_code(),
            -22
        );
        assert_eq!(TransformError::InvalidThreadCount(0).status_code(), -22);
        assert_eq!(
            TransformError::ShortWrite {
                path: p.clone(),
                expected: 10,
                actual: 3
            }
            .status_code(),
            -5
        );
        assert_eq!(
            TransformError::OutOfMemory { requested: 1 }.status_code(),
            -12
        );
        assert_eq!(
            TransformError::SpawnFailure {
                index: 1,
                source: io::Error::other("no threads")
            }
            .status_code(),
            -11
        );
    }

    #[test]
    fn test_io_status_uses_raw_errno() {
        let err = TransformError::Io {
            path: PathBuf::from("/x"),
            source: io::Error::from_raw_os_error(28), // ENOSPC
        };
        assert_eq!(err.status_code(), -28);

        let err = TransformError::Io {
            path: PathBuf::from("/x"),
            source: io::Error::other("synthetic"),
        };
        assert_eq!(err.status_code(), -5);
    }

    #[test]
    fn test_status_code_success() {
        let status = StatusCode::success();
        assert!(status.is_success());
        assert_eq!(status.code(), 0);
        assert_eq!(status.message(), None);
        assert_eq!(status.to_string(), "0 (success)");
    }

    #[test]
    fn test_status_code_from_error() {
        let err = TransformError::InvalidThreadCount(0);
        let status = StatusCode::from(&err);
        assert!(!status.is_success());
        assert_eq!(status.code(), -22);
        assert!(status.message().unwrap().contains("invalid thread count"));
    }

    #[test]
    fn test_failure_never_reads_as_success() {
        assert_eq!(StatusCode::failure(0, "odd").code(), -5);
        assert_eq!(StatusCode::failure(7, "odd").code(), -5);
        assert_eq!(StatusCode::failure(-2, "gone").code(), -2);
    }
}
