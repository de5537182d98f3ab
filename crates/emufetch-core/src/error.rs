//! Error types for emufetch core

use emufetch_types::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

/// Why a stream copy into the scratch file stopped early
#[derive(Debug, Error)]
pub enum PersistCause {
    #[error("source stream failed: {0}")]
    Source(#[source] reqwest::Error),

    #[error("scratch write failed: {0}")]
    Sink(#[source] std::io::Error),

    #[error("transfer truncated, expected {expected} bytes")]
    Truncated { expected: u64 },
}

/// Errors that can occur while acquiring and placing remote content
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No file id found in provider URL: {0}")]
    MissingFileId(String),

    #[error("Unable to find confirmation token for provider file {file_id}")]
    ConfirmationTokenNotFound { file_id: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server error: {status} - {url}")]
    ServerError { status: u16, url: String },

    #[error("Failed to persist download after {bytes_written} bytes: {cause}")]
    PersistenceFailed { bytes_written: u64, cause: PersistCause },

    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("Zip extraction failed: {0}")]
    ZipExtractionFailed(String),

    #[error("7z extraction failed (exit code {code:?}): {detail}")]
    SevenZipExtractionFailed { code: Option<i32>, detail: String },

    #[error("Archive tool {} could not be started: {source}", .program.display())]
    ArchiveToolUnavailable {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No files extracted into {}", .0.display())]
    NoFilesExtracted(PathBuf),

    #[error("Failed to remove scratch file {}: {source}", .path.display())]
    CleanupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file {}: {source}", .path.display())]
    InvalidSettings {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Acquisition task ended abnormally: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),

    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AcquireError {
    /// Stable classification for callers serializing the failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            AcquireError::InvalidRequest(_) | AcquireError::InvalidSettings { .. } => {
                ErrorKind::InvalidRequest
            }
            AcquireError::MissingFileId(_) => ErrorKind::MissingFileId,
            AcquireError::ConfirmationTokenNotFound { .. } => ErrorKind::ConfirmationTokenNotFound,
            AcquireError::Network(_) | AcquireError::ServerError { .. } => ErrorKind::Network,
            AcquireError::PersistenceFailed { .. } => ErrorKind::PersistenceFailed,
            AcquireError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            AcquireError::ZipExtractionFailed(_) => ErrorKind::ZipExtractionFailed,
            AcquireError::SevenZipExtractionFailed { .. } => ErrorKind::SevenZipExtractionFailed,
            AcquireError::ArchiveToolUnavailable { .. } => ErrorKind::ArchiveToolUnavailable,
            AcquireError::NoFilesExtracted(_) => ErrorKind::NoFilesExtracted,
            AcquireError::CleanupFailed { .. } => ErrorKind::CleanupFailed,
            AcquireError::NotFound(_) => ErrorKind::NotFound,
            AcquireError::TaskFailed(_) | AcquireError::Io(_) => ErrorKind::Io,
        }
    }

    /// Check if re-issuing the same request could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AcquireError::Network(_) => true,
            AcquireError::ServerError { status, .. } => *status >= 500,
            AcquireError::PersistenceFailed { cause, .. } => {
                matches!(cause, PersistCause::Source(_) | PersistCause::Truncated { .. })
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_failures_are_not_retryable() {
        assert!(!AcquireError::UnsupportedFormat(".exe".into()).is_retryable());
        assert!(!AcquireError::MissingFileId("https://drive.google.com/".into()).is_retryable());
        assert!(!AcquireError::ConfirmationTokenNotFound { file_id: "x".into() }.is_retryable());
    }

    #[test]
    fn server_errors_retry_only_on_5xx() {
        let bad_gateway = AcquireError::ServerError { status: 502, url: "u".into() };
        let not_found = AcquireError::ServerError { status: 404, url: "u".into() };
        assert!(bad_gateway.is_retryable());
        assert!(!not_found.is_retryable());
        assert_eq!(not_found.kind(), ErrorKind::Network);
    }

    #[test]
    fn persistence_retry_depends_on_cause() {
        let disk = AcquireError::PersistenceFailed {
            bytes_written: 10,
            cause: PersistCause::Sink(std::io::Error::other("disk full")),
        };
        let truncated = AcquireError::PersistenceFailed {
            bytes_written: 10,
            cause: PersistCause::Truncated { expected: 20 },
        };
        assert!(!disk.is_retryable());
        assert!(truncated.is_retryable());
        assert!(disk.to_string().contains("after 10 bytes"));
    }
}
