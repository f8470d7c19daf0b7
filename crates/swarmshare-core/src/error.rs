//! Error types for swarmshare.
//!
//! This module provides a unified error type for all swarmshare operations,
//! with specific error variants for different failure modes.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// A specialized `Result` type for swarmshare operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for swarmshare.
#[derive(Error, Debug)]
pub enum Error {
    /// Could not open a connection to a tracker or peer (E001)
    #[error("failed to connect to {addr}: {reason}")]
    ConnectionFailed {
        /// Remote address
        addr: SocketAddr,
        /// Underlying reason
        reason: String,
    },

    /// Remote side closed the connection mid-exchange (E002)
    #[error("connection closed by {0}")]
    ConnectionClosed(SocketAddr),

    /// Login rejected by the tracker (E003)
    #[error("login failed for user '{0}'")]
    LoginFailed(String),

    /// Username already taken (E004)
    #[error("username '{0}' already exists")]
    UserExists(String),

    /// Shared directory already exists (E005)
    #[error("directory '{0}' already exists")]
    DirectoryExists(String),

    /// File not found locally or on a peer (E006)
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// No online peer shares the requested file (E007)
    #[error("no peer is sharing '{0}'")]
    NoCandidates(String),

    /// Swarm download finished with chunks missing (E008)
    #[error("download of '{file}' incomplete: {} chunk(s) missing", missing.len())]
    IncompleteDownload {
        /// File being downloaded
        file: String,
        /// Chunk indices that could not be fetched from any candidate
        missing: Vec<u64>,
    },

    /// A peer returned a chunk of the wrong length
    #[error("chunk {chunk} of '{file}' has {actual} bytes, expected {expected}")]
    ChunkLength {
        /// File being downloaded
        file: String,
        /// Chunk index
        chunk: u64,
        /// Expected length in bytes
        expected: u64,
        /// Received length in bytes
        actual: u64,
    },

    /// Explicit `ERROR:` token returned by the remote side
    #[error("remote error: {0}")]
    Remote(String),

    /// Invalid path or name
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Request argument that cannot be sent as a single protocol token
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid protocol message
    #[error("invalid protocol message: {0}")]
    ProtocolError(String),

    /// Catalog (user/directory store) failure
    #[error("catalog error: {0}")]
    CatalogError(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Operation timeout
    #[error("operation timed out after {0} seconds")]
    Timeout(u64),
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::ConnectionFailed { .. } => Some("E001"),
            Self::ConnectionClosed(_) => Some("E002"),
            Self::LoginFailed(_) => Some("E003"),
            Self::UserExists(_) => Some("E004"),
            Self::DirectoryExists(_) => Some("E005"),
            Self::FileNotFound(_) => Some("E006"),
            Self::NoCandidates(_) => Some("E007"),
            Self::IncompleteDownload { .. } => Some("E008"),
            _ => None,
        }
    }

    /// Returns whether this error is recoverable (can be retried).
    ///
    /// Chunk workers use this to decide whether another candidate is worth
    /// trying for the same range.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::ConnectionClosed(_)
                | Self::ChunkLength { .. }
                | Self::Timeout(_)
                | Self::Io(_)
                | Self::FileNotFound(_)
                | Self::Remote(_)
                | Self::ProtocolError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::LoginFailed("alice".into()).code(), Some("E003"));
        assert_eq!(
            Error::IncompleteDownload {
                file: "a.bin".into(),
                missing: vec![1, 4],
            }
            .code(),
            Some("E008")
        );
        assert_eq!(Error::Timeout(30).code(), None);
    }

    #[test]
    fn test_incomplete_download_message() {
        let err = Error::IncompleteDownload {
            file: "movie.mkv".into(),
            missing: vec![2, 3, 7],
        };
        assert_eq!(
            err.to_string(),
            "download of 'movie.mkv' incomplete: 3 chunk(s) missing"
        );
    }

    #[test]
    fn test_recoverable() {
        assert!(Error::Timeout(5).is_recoverable());
        assert!(Error::FileNotFound("x".into()).is_recoverable());
        assert!(!Error::LoginFailed("bob".into()).is_recoverable());
        assert!(!Error::NoCandidates("x".into()).is_recoverable());
        assert!(!Error::InvalidArgument("username".into()).is_recoverable());
    }
}
