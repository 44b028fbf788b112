use archivist_inventory::{DeviceStatus, StorageDevice};
use serde::{Deserialize, Serialize};

/// One entry of the storage API's device catalog, as sent over the wire.
///
/// `id` is the device's unique name; it is also the location key used in
/// snapshots and storage documents. An unknown `status` fails decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceListing {
    pub id: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub location: String,
    pub status: DeviceStatus,
    #[serde(default)]
    pub access: String,
}

impl DeviceListing {
    pub fn new(id: impl Into<String>, status: DeviceStatus) -> Self {
        Self {
            id: id.into(),
            country: String::new(),
            location: String::new(),
            status,
            access: String::new(),
        }
    }
}

impl From<DeviceListing> for StorageDevice {
    fn from(listing: DeviceListing) -> Self {
        Self {
            name: listing.id,
            country: listing.country,
            location: listing.location,
            status: listing.status,
            access: listing.access,
        }
    }
}
