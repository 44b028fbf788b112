//! Error types for the [`apply`](super) module.

use derive_more::{Display, Error};

/// An apply error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for apply operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of an apply failure.
///
/// Per-file failures never surface here; they are logged and counted in the
/// [`ApplyReport`](super::ApplyReport). Only failures that leave the batch in
/// an unknown state do.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A staged write via [`archivist_catalog::Repository`] failed.
    #[display("store write failed")]
    Store,
    /// A worker task panicked or was cancelled.
    #[display("apply worker did not finish")]
    Worker,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store => true,
            Self::Worker => false,
        }
    }
}
