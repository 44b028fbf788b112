//! Source Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A source error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for source operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The endpoint could not be reached or the transfer broke off.
    #[display("request to {_0} failed")]
    Network(#[error(not(source))] String),
    /// The endpoint answered with a non-success status.
    #[display("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },
    /// The response body did not have the expected shape.
    #[display("unexpected response body from {_0}")]
    Decode(#[error(not(source))] String),
    /// A URL could not be built for the request.
    #[display("cannot build request URL: {_0}")]
    InvalidUrl(#[error(not(source))] String),
    /// Writing the downloaded snapshot to disk failed.
    #[display("cannot write snapshot: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Io(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode(_) | Self::InvalidUrl(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Network("http://x".to_string()), true)]
    #[case(ErrorKind::Status { url: "http://x".to_string(), status: 503 }, true)]
    #[case(ErrorKind::Status { url: "http://x".to_string(), status: 404 }, false)]
    #[case(ErrorKind::Decode("http://x".to_string()), false)]
    fn test_is_retryable(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }
}
