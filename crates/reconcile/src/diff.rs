use archivist_catalog::MasterIndex;
use archivist_inventory::{Checksum, LocationIndex, PhysicalCopy, same_paths};
use std::collections::HashMap;
use std::collections::hash_map;

/// The checksums whose copy set at one location changed, with their new
/// copy lists. An empty list means the location no longer holds the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    location: String,
    changes: HashMap<Checksum, Vec<PhysicalCopy>>,
}

impl Diff {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            changes: HashMap::new(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn insert(&mut self, checksum: Checksum, copies: Vec<PhysicalCopy>) {
        self.changes.insert(checksum, copies);
    }

    pub fn get(&self, checksum: &Checksum) -> Option<&[PhysicalCopy]> {
        self.changes.get(checksum).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, Checksum, Vec<PhysicalCopy>> {
        self.changes.iter()
    }
}

/// Compare a location's fresh snapshot with what the master index records
/// for that same location.
///
/// Copy lists are compared as sets of paths; size and modification time
/// never count as a change. Checksums that only the snapshot knows about are
/// included too, they are resolved (or not) against file rows on apply.
///
/// One pass over the master index and one over the snapshot.
pub fn diff(master: &MasterIndex, fresh: &LocationIndex) -> Diff {
    let location = fresh.location();
    let mut result = Diff::new(location);

    for (checksum, entry) in master.iter() {
        let current = entry.copies.get(location).unwrap_or_default();
        let reported = fresh.get(checksum);
        if !same_paths(current, reported) {
            result.insert(*checksum, reported.to_vec());
        }
    }
    for (checksum, copies) in fresh.iter() {
        if master.get(checksum).is_none() {
            result.insert(*checksum, copies.clone());
        }
    }
    result
}
