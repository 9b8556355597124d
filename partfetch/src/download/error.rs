//! Error types for the download engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::transport::TransportError;

/// Result type for download engine operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Errors that can occur while probing, downloading, verifying or merging.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// An HTTP exchange failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Target metadata could not be established.
    #[error("probe of {url} failed: {reason}")]
    Probe { url: String, reason: String },

    /// The server or the disk reported a different size than requested.
    #[error("part {part}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        part: u32,
        expected: u64,
        actual: u64,
    },

    /// Bytes on disk do not match their reference.
    #[error("integrity check failed for {} at offset {offset}", path.display())]
    Integrity { path: PathBuf, offset: u64 },

    /// Network verification deleted these parts.
    #[error("parts {parts:?} differ from the server and were deleted")]
    Rejected { parts: Vec<u32> },

    /// A part index is missing from an otherwise ordered run.
    #[error("part {part} missing")]
    Gap { part: u32 },

    /// Committed parts do not add up to the target size.
    #[error("download incomplete: {actual} of {expected} bytes committed")]
    Incomplete { expected: u64, actual: u64 },

    /// Failed to read a file or directory.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a file or directory.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// Reading a response body failed mid-stream.
    #[error("stream from {url} failed: {source}")]
    Stream { url: String, source: io::Error },

    /// Consecutive waves committed nothing.
    #[error("no progress after {waves} waves, {pending} parts still pending")]
    Stalled { waves: u32, pending: usize },

    /// A worker task ended abnormally.
    #[error("worker task failed: {0}")]
    Worker(String),

    /// No remote artifact matched the configured source.
    #[error("no artifact available: {0}")]
    NoArtifact(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::InvalidConfig(_))
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::ReadFailed {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::WriteFailed {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(DownloadError::Gap { part: 3 }.to_string(), "part 3 missing");

        let err = DownloadError::SizeMismatch {
            part: 2,
            expected: 300,
            actual: 1000,
        };
        assert_eq!(err.to_string(), "part 2: expected 300 bytes, got 1000");

        let err = DownloadError::Stalled {
            waves: 3,
            pending: 1,
        };
        assert!(err.to_string().contains("3 waves"));
    }

    #[test]
    fn test_transport_error_is_transparent() {
        let err: DownloadError = TransportError::Timeout {
            url: "http://example.com".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "request to http://example.com timed out");
    }

    #[test]
    fn test_is_retryable() {
        assert!(DownloadError::Gap { part: 1 }.is_retryable());
        assert!(DownloadError::Stalled {
            waves: 3,
            pending: 2
        }
        .is_retryable());
        assert!(!DownloadError::Cancelled.is_retryable());
        assert!(!DownloadError::InvalidConfig("x".to_string()).is_retryable());
    }
}
