use std::path::PathBuf;
use thiserror::Error;

use crate::transfer::hash::ChecksumRecord;

/// Failures surfaced by the transfer engine
#[derive(Debug, Error)]
pub enum TransferError {
    /// Peer closed the connection before the expected bytes arrived
    #[error("connection lost: received {received}/{expected} bytes")]
    ConnectionLost { received: u64, expected: u64 },

    /// Peer closed the connection while a control message was expected
    #[error("connection closed by peer while waiting for {0}")]
    ConnectionClosed(&'static str),

    /// The file being sent ended before its declared size
    #[error("source {} changed during transfer: read {actual}/{expected} bytes", .path.display())]
    SourceChanged {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("failed to package {}: {source}", .path.display())]
    PackagingFailure {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to extract {}: {source}", .path.display())]
    ExtractionFailure {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// A received archive could not be unpacked and was kept as-is
    #[error("received archive kept at {}: {source}", .archive.display())]
    ArchiveKept {
        archive: PathBuf,
        checksum: ChecksumRecord,
        #[source]
        source: Box<TransferError>,
    },

    /// Peer sent something that does not fit the session protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("entry not found: {}", .0.display())]
    EntryNotFound(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// True when the peer went away mid-session
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            TransferError::ConnectionLost { .. } | TransferError::ConnectionClosed(_)
        )
    }
}

pub type Result<T, E = TransferError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_lost_message() {
        let err = TransferError::ConnectionLost {
            received: 10,
            expected: 2000,
        };
        assert!(err.is_connection_lost());
        assert_eq!(err.to_string(), "connection lost: received 10/2000 bytes");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: TransferError = io.into();
        assert!(matches!(err, TransferError::Io(_)));
        assert!(!err.is_connection_lost());
    }

    #[test]
    fn test_connection_closed_counts_as_lost() {
        let err = TransferError::ConnectionClosed("catalog");
        assert!(err.is_connection_lost());
        assert_eq!(
            err.to_string(),
            "connection closed by peer while waiting for catalog"
        );
    }
}
