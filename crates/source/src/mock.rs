//! In-memory snapshot source for testing.

use crate::error::{ErrorKind, Result};
use crate::{DeviceListing, SnapshotSource};
use async_trait::async_trait;
use exn::ResultExt;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;

/// In-memory snapshot source.
///
/// Devices and snapshots sit behind [`RwLock`]s so tests can change what the
/// "API" reports between two runs without rebuilding the engine. Downloading
/// a location with no snapshot fails like the real API does, with a 404.
///
/// # Examples
///
/// ```ignore
/// use archivist_inventory::DeviceStatus;
/// use archivist_source::{DeviceListing, MockSource};
///
/// let source = MockSource::new([DeviceListing::new("il-merkaz", DeviceStatus::Online)])
///     .with_snapshot("il-merkaz", "[\"/a\",\"da39a3ee5e6b4b0d3255bfef95601890afd80709\",1,2]\n");
/// ```
#[derive(Debug, Default)]
pub struct MockSource {
    devices: RwLock<Vec<DeviceListing>>,
    snapshots: RwLock<HashMap<String, Vec<u8>>>,
}

impl MockSource {
    pub fn new(devices: impl IntoIterator<Item = DeviceListing>) -> Self {
        Self {
            devices: RwLock::new(devices.into_iter().collect()),
            snapshots: RwLock::default(),
        }
    }

    pub fn with_snapshot(mut self, location: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.snapshots.get_mut().insert(location.into(), contents.into());
        self
    }

    pub async fn set_devices(&self, devices: impl IntoIterator<Item = DeviceListing>) {
        *self.devices.write().await = devices.into_iter().collect();
    }

    pub async fn set_snapshot(&self, location: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.snapshots.write().await.insert(location.into(), contents.into());
    }

    pub async fn remove_snapshot(&self, location: &str) {
        self.snapshots.write().await.remove(location);
    }
}

#[async_trait]
impl SnapshotSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn devices(&self) -> Result<Vec<DeviceListing>> {
        Ok(self.devices.read().await.clone())
    }

    async fn download(&self, location: &str, dest: &Path) -> Result<u64> {
        let snapshots = self.snapshots.read().await;
        let Some(contents) = snapshots.get(location) else {
            exn::bail!(ErrorKind::Status {
                url: format!("mock://catalog/{location}"),
                status: 404,
            });
        };
        tokio::fs::write(dest, contents)
            .await
            .or_raise(|| ErrorKind::Io(dest.to_path_buf()))?;
        Ok(contents.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archivist_inventory::DeviceStatus;

    #[tokio::test]
    async fn test_mock_source() {
        let source = MockSource::new([DeviceListing::new("a", DeviceStatus::Online)]).with_snapshot("a", "line\n");
        assert_eq!(source.devices().await.unwrap().len(), 1);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.txt");
        assert_eq!(source.download("a", &dest).await.unwrap(), 5);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "line\n");

        let err = source.download("b", &dest).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Status { status: 404, .. }));

        source.set_devices([]).await;
        source.remove_snapshot("a").await;
        assert!(source.devices().await.unwrap().is_empty());
        assert!(source.download("a", &dest).await.is_err());
    }
}
