use crate::error::{Error, ErrorKind};
use archivist_inventory::{Checksum, DeviceStatus, FileCopies, StorageDevice};
use exn::ResultExt;
use tracing::warn;

/// One row of the master index query.
#[derive(sqlx::FromRow)]
pub(crate) struct MasterRow {
    pub id: i64,
    pub checksum: String,
    pub storage: Option<String>,
}
impl MasterRow {
    /// Decode the row. A checksum that cannot be decoded leaves nothing to key
    /// the file by, so the row is dropped; an unreadable storage document is
    /// treated as no copies at all.
    pub fn decode(self) -> Option<(Checksum, i64, FileCopies)> {
        let Some(checksum) = Checksum::from_hex(&self.checksum) else {
            warn!(file_id = self.id, checksum = self.checksum, "Skipping file with undecodable checksum");
            return None;
        };
        let copies = match self.storage.as_deref().map(FileCopies::from_json).transpose() {
            Ok(copies) => copies.unwrap_or_default(),
            Err(e) => {
                warn!(file_id = self.id, error = %e, "Unreadable storage document, assuming no copies");
                FileCopies::new()
            },
        };
        Some((checksum, self.id, copies))
    }
}

/// A merged storage document ready to be staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedDocument {
    pub checksum: Checksum,
    /// The complete new `storage` value. Empty removes the attribute.
    pub copies: FileCopies,
}

/// Outcome of one staged apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedApply {
    /// Rows written to the staging table.
    pub staged: u64,
    /// File rows changed by the joined update.
    pub affected: u64,
    /// Checksums whose file row the update matched. Documents for any other
    /// checksum were not stored.
    pub written: Vec<Checksum>,
}

/// Device catalog changes to apply in one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceChanges {
    pub create: Vec<StorageDevice>,
    pub update: Vec<StorageDevice>,
    /// Names of devices to remove.
    pub remove: Vec<String>,
}
impl DeviceChanges {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }

    pub fn len(&self) -> usize {
        self.create.len() + self.update.len() + self.remove.len()
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct DeviceRow {
    pub name: String,
    pub country: String,
    pub location: String,
    pub status: String,
    pub access: String,
}
impl TryFrom<DeviceRow> for StorageDevice {
    type Error = Error;
    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: row
                .status
                .parse::<DeviceStatus>()
                .or_raise(|| ErrorKind::InvalidData("device status"))?,
            name: row.name,
            country: row.country,
            location: row.location,
            access: row.access,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA1: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

    #[test]
    fn test_master_row_without_storage() {
        let row = MasterRow {
            id: 1,
            checksum: SHA1.to_string(),
            storage: None,
        };
        let (checksum, id, copies) = row.decode().unwrap();
        assert_eq!(checksum.to_string(), SHA1);
        assert_eq!(id, 1);
        assert!(copies.is_empty());
    }

    #[test]
    fn test_master_row_with_bad_storage_has_no_copies() {
        let row = MasterRow {
            id: 1,
            checksum: SHA1.to_string(),
            storage: Some("\"not an object\"".to_string()),
        };
        let (_, _, copies) = row.decode().unwrap();
        assert!(copies.is_empty());
    }

    #[test]
    fn test_master_row_with_bad_checksum_is_dropped() {
        let row = MasterRow {
            id: 1,
            checksum: "abc".to_string(),
            storage: None,
        };
        assert!(row.decode().is_none());
    }

    #[test]
    fn test_device_row_status() {
        let row = DeviceRow {
            name: "il-merkaz".to_string(),
            country: "il".to_string(),
            location: "merkaz".to_string(),
            status: "nearline".to_string(),
            access: "public".to_string(),
        };
        assert_eq!(StorageDevice::try_from(row).unwrap().status, DeviceStatus::Nearline);

        let row = DeviceRow {
            name: "x".to_string(),
            country: String::new(),
            location: String::new(),
            status: "bogus".to_string(),
            access: String::new(),
        };
        let err = StorageDevice::try_from(row).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData(_)));
    }
}
