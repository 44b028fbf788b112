use archivist_inventory::{Checksum, FileCopies, PhysicalCopy};
use std::collections::HashMap;
use std::collections::hash_map;

/// What the catalog believes about one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MasterEntry {
    pub file_id: i64,
    pub copies: FileCopies,
}

/// Snapshot of every file with a known checksum and where its copies live.
///
/// Loaded once per run and never mutated afterwards; writes go straight to
/// the store.
#[derive(Debug, Clone, Default)]
pub struct MasterIndex {
    entries: HashMap<Checksum, MasterEntry>,
}

impl MasterIndex {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, checksum: Checksum, file_id: i64, copies: FileCopies) {
        self.entries.insert(checksum, MasterEntry { file_id, copies });
    }

    pub fn get(&self, checksum: &Checksum) -> Option<&MasterEntry> {
        self.entries.get(checksum)
    }

    pub fn file_id(&self, checksum: &Checksum) -> Option<i64> {
        self.entries.get(checksum).map(|e| e.file_id)
    }

    /// Copies recorded for `checksum` at `location`; empty when there are none.
    pub fn copies_at(&self, checksum: &Checksum, location: &str) -> &[PhysicalCopy] {
        self.entries
            .get(checksum)
            .and_then(|e| e.copies.get(location))
            .unwrap_or_default()
    }

    /// `true` when at least one file records a copy at `location`.
    pub fn has_location(&self, location: &str) -> bool {
        self.entries.values().any(|e| e.copies.get(location).is_some())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, Checksum, MasterEntry> {
        self.entries.iter()
    }
}
