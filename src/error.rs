//! Binary Error Types

use derive_more::{Display, Error};

/// A top-level error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for the binary.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration could not be loaded")]
    Config,
    #[display("catalog database could not be opened")]
    Store,
    #[display("snapshot source could not be set up")]
    Source,
    #[display("reconciliation run failed")]
    Run,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store | Self::Run => true,
            Self::Config | Self::Source => false,
        }
    }
}
