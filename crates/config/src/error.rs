use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// An explicitly requested configuration file does not exist.
    #[display("configuration file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// The configuration file extension is not one of yaml, yml, toml or json.
    #[display("unsupported configuration format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// The merged configuration could not be deserialized.
    #[display("could not read configuration")]
    Extract,
    /// A value deserialized fine but is not usable.
    #[display("invalid configuration value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ErrorKind {
    /// Configuration errors need an operator to fix something; none are retryable.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
