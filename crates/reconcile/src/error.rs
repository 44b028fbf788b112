//! Reconcile Error Types
//!
//! One variant per phase of a run. Phase functions raise their variant over
//! whatever child error caused them to fail, so the full tree is kept for the
//! top-level report.

use derive_more::{Display, Error};

/// A reconcile error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for reconcile operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("device catalog sync failed")]
    DeviceSync,
    #[display("loading the master index failed")]
    LoadMaster,
    #[display("downloading the snapshot for {_0} failed")]
    Download(#[error(not(source))] String),
    #[display("reading the snapshot for {_0} failed")]
    Parse(#[error(not(source))] String),
    #[display("applying changes for {_0} failed")]
    Apply(#[error(not(source))] String),
    #[display("orphan reconciliation failed")]
    Orphans,
    #[display("scratch directory cleanup failed")]
    Cleanup,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Every phase is safe to re-run: committed batches and pages stay
    /// committed and the next run only sees what is left.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::DeviceSync | Self::LoadMaster | Self::Download(_) | Self::Apply(_) | Self::Orphans => true,
            Self::Parse(_) | Self::Cleanup => false,
        }
    }
}
