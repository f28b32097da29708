//! Error types for gitobj

use crate::model::ObjectKind;
use std::io;
use thiserror::Error;

/// Result type alias for gitobj operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in gitobj operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[source] io::Error),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Corrupt object: {0}")]
    Corrupt(String),

    #[error("Corrupt object: compressed stream ended before its end marker")]
    Truncated,

    #[error("Decompression error: {0}")]
    Decompress(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Expected a {expected} object, found a {found}")]
    UnexpectedKind {
        expected: ObjectKind,
        found: ObjectKind,
    },
}

// Errors raised inside `Read` impls travel wrapped in an io::Error; unwrap
// them so callers still see the original variant.
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            return Error::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(other)) => Error::Io(io::Error::new(io::ErrorKind::Other, other)),
            None => Error::Io(io::Error::new(io::ErrorKind::Other, "unknown I/O error")),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(inner) => inner,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

impl Error {
    /// True for every kind of damaged-object error
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            Error::Corrupt(_) | Error::Truncated | Error::Decompress(_)
        )
    }

    /// Process exit status the CLI reports for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::NotFound(_) => 2,
            e if e.is_corrupt() => 3,
            Error::Io(_) => 4,
            _ => 1,
        }
    }
}
