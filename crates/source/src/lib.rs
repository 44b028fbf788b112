//! Where snapshots come from.
//!
//! A [`SnapshotSource`] provides the storage device catalog and, per device,
//! a flat-file snapshot of every copy the device currently holds. The real
//! source is the storage API over HTTP ([`HttpSource`]); tests use
//! `MockSource` (feature `mock`).

pub mod error;
mod http;
mod listing;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use crate::http::HttpSource;
pub use crate::listing::DeviceListing;
#[cfg(any(test, feature = "mock"))]
pub use crate::mock::MockSource;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub type SourceHandle = Arc<dyn SnapshotSource>;

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Name of the source, for logging only.
    fn name(&self) -> &str;

    /// Fetch the current device catalog.
    async fn devices(&self) -> Result<Vec<DeviceListing>>;

    /// Download the snapshot for `location` into the file at `dest`,
    /// replacing it if it exists. Returns the number of bytes written.
    ///
    /// On failure no partial file is left behind.
    async fn download(&self, location: &str, dest: &Path) -> Result<u64>;
}
