use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeedsError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Peer unreachable: {addr}: {reason}")]
    Unreachable { addr: String, reason: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("No storage daemons registered")]
    NoMinions,

    #[error("File too large: {0}")]
    FileTooLarge(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, DeedsError>;

/// Error kinds that survive a trip over the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    NotADirectory,
    IsADirectory,
    InvalidPath,
    Unreachable,
    Timeout,
    NoMinions,
    FileTooLarge,
    Other,
}

/// Serialized form of a [`DeedsError`] carried in RPC replies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&DeedsError> for WireError {
    fn from(err: &DeedsError) -> Self {
        let (kind, message) = match err {
            DeedsError::NotFound(m) => (ErrorKind::NotFound, m.clone()),
            DeedsError::AlreadyExists(m) => (ErrorKind::AlreadyExists, m.clone()),
            DeedsError::NotADirectory(m) => (ErrorKind::NotADirectory, m.clone()),
            DeedsError::IsADirectory(m) => (ErrorKind::IsADirectory, m.clone()),
            DeedsError::InvalidPath(m) => (ErrorKind::InvalidPath, m.clone()),
            DeedsError::Unreachable { addr, reason } => {
                (ErrorKind::Unreachable, format!("{}: {}", addr, reason))
            }
            DeedsError::Timeout(m) => (ErrorKind::Timeout, m.clone()),
            DeedsError::NoMinions => (ErrorKind::NoMinions, String::new()),
            DeedsError::FileTooLarge(m) => (ErrorKind::FileTooLarge, m.clone()),
            other => (ErrorKind::Other, other.to_string()),
        };
        WireError { kind, message }
    }
}

impl From<WireError> for DeedsError {
    fn from(err: WireError) -> Self {
        match err.kind {
            ErrorKind::NotFound => DeedsError::NotFound(err.message),
            ErrorKind::AlreadyExists => DeedsError::AlreadyExists(err.message),
            ErrorKind::NotADirectory => DeedsError::NotADirectory(err.message),
            ErrorKind::IsADirectory => DeedsError::IsADirectory(err.message),
            ErrorKind::InvalidPath => DeedsError::InvalidPath(err.message),
            ErrorKind::Unreachable => DeedsError::Unreachable {
                addr: String::from("remote"),
                reason: err.message,
            },
            ErrorKind::Timeout => DeedsError::Timeout(err.message),
            ErrorKind::NoMinions => DeedsError::NoMinions,
            ErrorKind::FileTooLarge => DeedsError::FileTooLarge(err.message),
            ErrorKind::Other => DeedsError::Remote(err.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_survives_wire() {
        let err = DeedsError::NotFound("/docs".to_string());
        let wire = WireError::from(&err);
        assert_eq!(wire.kind, ErrorKind::NotFound);

        match DeedsError::from(wire) {
            DeedsError::NotFound(path) => assert_eq!(path, "/docs"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_io_error_becomes_remote() {
        let err = DeedsError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));
        let wire = WireError::from(&err);
        assert_eq!(wire.kind, ErrorKind::Other);
        assert!(matches!(DeedsError::from(wire), DeedsError::Remote(m) if m.contains("disk gone")));
    }
}
