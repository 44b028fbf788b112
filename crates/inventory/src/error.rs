//! Inventory Error Types
//!
//! Two layers: [`ErrorKind`] for failures that stop reading a snapshot as a
//! whole (wrapped in [`exn::Exn`] for location tracking), and [`LineError`]
//! for a single bad line, which is counted and skipped by the reader.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An inventory error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for inventory operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The snapshot file could not be opened.
    #[display("cannot open snapshot: {}", _0.display())]
    Open(#[error(not(source))] PathBuf),
    /// Reading from an already open snapshot failed part way through.
    #[display("I/O error while reading snapshot")]
    Io,
    /// A value could not be decoded into a domain type.
    #[display("failed to parse field '{field}', found value: {value}")]
    ParseError {
        /// The field that failed to parse.
        field: &'static str,
        /// The offending value.
        value: String,
    },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Open(_) | Self::Io)
    }
}

/// Why a single snapshot line was rejected.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum LineError {
    /// The line is not valid UTF-8.
    #[display("line is not valid UTF-8")]
    Encoding,
    /// The line does not have the `["<path>","<checksum>",<size>,<mtime>]` shape.
    #[display("malformed line: {_0}")]
    Malformed(#[error(not(source))] &'static str),
    /// The checksum field is not a 40 character hex digest.
    #[display("bad checksum: {_0}")]
    InvalidChecksum(#[error(not(source))] String),
    /// A numeric field is not an integer.
    #[display("{field} is not an integer: {value}")]
    InvalidNumber {
        /// Either `size` or `mtime`.
        field: &'static str,
        /// The offending value.
        value: String,
    },
}

/// A rejected line, with its 1-based line number in the snapshot file.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
#[display("line {line}: {kind}")]
pub struct ParseError {
    pub line: usize,
    #[error(source)]
    pub kind: LineError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_names_the_line() {
        let err = ParseError {
            line: 42,
            kind: LineError::InvalidChecksum("xyz".to_string()),
        };
        assert_eq!(err.to_string(), "line 42: bad checksum: xyz");
    }

    #[test]
    fn io_errors_are_retryable() {
        assert!(ErrorKind::Open(PathBuf::from("/tmp/index.txt")).is_retryable());
        assert!(ErrorKind::Io.is_retryable());
        assert!(
            !ErrorKind::ParseError {
                field: "checksum",
                value: "nope".to_string()
            }
            .is_retryable()
        );
    }
}
