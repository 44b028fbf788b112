//! Device Catalog Sync.
//!
//! Brings the `storages` table in line with the source's device listing.
//! Copies that still point at a removed device are left for the orphan pass.

use crate::error::{ErrorKind, Result};
use archivist_catalog::{DeviceChanges, Repository};
use archivist_inventory::StorageDevice;
use archivist_source::{DeviceListing, SourceHandle};
use exn::ResultExt;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, instrument, warn};

/// Work out which devices to create, update and remove.
///
/// Pure: the same stored devices and listing always give the same plan, and
/// a listing that matches the store gives an empty one. When an id is listed
/// more than once the last entry wins.
pub fn plan(stored: &[StorageDevice], listing: Vec<DeviceListing>) -> DeviceChanges {
    let mut wanted: BTreeMap<String, StorageDevice> = BTreeMap::new();
    for entry in listing {
        if entry.id.is_empty() {
            warn!("Ignoring device listing entry without an id");
            continue;
        }
        let device = StorageDevice::from(entry);
        if let Some(previous) = wanted.insert(device.name.clone(), device) {
            warn!(device = %previous.name, "Device listed more than once, keeping the last entry");
        }
    }

    let existing: HashMap<&str, &StorageDevice> = stored.iter().map(|d| (d.name.as_str(), d)).collect();
    let mut changes = DeviceChanges::default();
    for (name, device) in &wanted {
        match existing.get(name.as_str()) {
            None => changes.create.push(device.clone()),
            Some(current) if *current != device => changes.update.push(device.clone()),
            Some(_) => {},
        }
    }
    changes.remove = stored
        .iter()
        .filter(|d| !wanted.contains_key(&d.name))
        .map(|d| d.name.clone())
        .collect();
    changes.remove.sort();
    changes
}

/// Fetch the listing, apply the plan, and return the device catalog as it
/// now stands (or would, in a dry run).
#[instrument(skip_all, fields(source = source.name()))]
pub async fn sync(repo: &Repository, source: &SourceHandle) -> Result<Vec<StorageDevice>> {
    let listing = source.devices().await.or_raise(|| ErrorKind::DeviceSync)?;
    let stored = repo.list_devices().await.or_raise(|| ErrorKind::DeviceSync)?;
    let changes = plan(&stored, listing);

    if changes.is_empty() {
        debug!(devices = stored.len(), "Device catalog unchanged");
        return Ok(stored);
    }
    repo.apply_device_changes(&changes).await.or_raise(|| ErrorKind::DeviceSync)?;
    info!(
        created = changes.create.len(),
        updated = changes.update.len(),
        removed = changes.remove.len(),
        "Device catalog synced"
    );

    let mut devices: BTreeMap<String, StorageDevice> = stored.into_iter().map(|d| (d.name.clone(), d)).collect();
    for name in &changes.remove {
        devices.remove(name);
    }
    for device in changes.create.into_iter().chain(changes.update) {
        devices.insert(device.name.clone(), device);
    }
    Ok(devices.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use archivist_catalog::Database;
    use archivist_inventory::DeviceStatus;
    use archivist_source::MockSource;
    use std::sync::Arc;

    fn listing(id: &str, status: DeviceStatus, access: &str) -> DeviceListing {
        DeviceListing {
            access: access.to_string(),
            ..DeviceListing::new(id, status)
        }
    }

    fn device(name: &str, status: DeviceStatus, access: &str) -> StorageDevice {
        listing(name, status, access).into()
    }

    #[test]
    fn test_plan_transitions() {
        let stored = vec![
            device("keep", DeviceStatus::Online, "public"),
            device("change", DeviceStatus::Online, "public"),
            device("drop", DeviceStatus::Online, "public"),
        ];
        let changes = plan(
            &stored,
            vec![
                listing("keep", DeviceStatus::Online, "public"),
                listing("change", DeviceStatus::Offline, "public"),
                listing("new", DeviceStatus::Nearline, "private"),
            ],
        );
        assert_eq!(changes.create, vec![device("new", DeviceStatus::Nearline, "private")]);
        assert_eq!(changes.update, vec![device("change", DeviceStatus::Offline, "public")]);
        assert_eq!(changes.remove, vec!["drop".to_string()]);
    }

    #[test]
    fn test_plan_duplicate_ids_last_wins() {
        let changes = plan(
            &[],
            vec![
                listing("dup", DeviceStatus::Online, "a"),
                listing("", DeviceStatus::Online, "x"),
                listing("dup", DeviceStatus::Offline, "b"),
            ],
        );
        assert_eq!(changes.create, vec![device("dup", DeviceStatus::Offline, "b")]);
        assert_eq!(changes.len(), 1);
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let mock = Arc::new(MockSource::new([
            listing("one", DeviceStatus::Online, "public"),
            listing("two", DeviceStatus::Nearline, "public"),
        ]));
        let source: SourceHandle = mock.clone();

        let first = sync(&repo, &source).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(repo.list_devices().await.unwrap(), first);

        // Nothing changed upstream: the plan is empty, so nothing is written.
        let stored = repo.list_devices().await.unwrap();
        assert!(plan(&stored, source.devices().await.unwrap()).is_empty());
        assert_eq!(sync(&repo, &source).await.unwrap(), first);

        mock.set_devices([listing("two", DeviceStatus::Offline, "public")]).await;
        let third = sync(&repo, &source).await.unwrap();
        assert_eq!(third, vec![device("two", DeviceStatus::Offline, "public")]);
        assert_eq!(repo.list_devices().await.unwrap(), third);
    }

    #[tokio::test]
    async fn test_sync_dry_run_reports_target() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db).with_dry_run(true);
        let source: SourceHandle = Arc::new(MockSource::new([listing("one", DeviceStatus::Online, "")]));
        let devices = sync(&repo, &source).await.unwrap();
        assert_eq!(devices.len(), 1);
        assert!(repo.list_devices().await.unwrap().is_empty());
    }
}
