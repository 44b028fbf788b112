//! Error types for the [`scratch`](super) module.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A scratch directory error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for scratch directory operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The location name cannot be used as a directory name.
    #[display("invalid location name: {_0:?}")]
    InvalidLocation(#[error(not(source))] String),
    #[display("scratch directory I/O failed: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
