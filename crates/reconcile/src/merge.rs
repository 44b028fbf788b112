use archivist_catalog::MasterIndex;
use archivist_inventory::{Checksum, FileCopies, PhysicalCopy};
use std::collections::HashMap;

/// Replace one location's copies in a storage document, leaving every other
/// location as it was. An empty list removes the location key.
pub fn merge(current: Option<&FileCopies>, location: &str, copies: Vec<PhysicalCopy>) -> FileCopies {
    let mut document = current.cloned().unwrap_or_default();
    document.set(location, copies);
    document
}

/// What merged documents are built on top of during a run.
///
/// The master index is the state at the start of the run; documents
/// committed since then are layered over it, so a later location merges
/// into an earlier location's committed change and not into the stale
/// snapshot.
#[derive(Debug)]
pub struct MergeBase<'a> {
    master: &'a MasterIndex,
    committed: HashMap<Checksum, FileCopies>,
}

impl<'a> MergeBase<'a> {
    pub fn new(master: &'a MasterIndex) -> Self {
        Self {
            master,
            committed: HashMap::new(),
        }
    }

    pub fn master(&self) -> &'a MasterIndex {
        self.master
    }

    /// Current document for a file: committed this run, otherwise as loaded.
    pub fn document(&self, checksum: &Checksum) -> Option<&FileCopies> {
        self.committed
            .get(checksum)
            .or_else(|| self.master.get(checksum).map(|e| &e.copies))
    }

    pub fn merged(&self, checksum: &Checksum, location: &str, copies: Vec<PhysicalCopy>) -> FileCopies {
        merge(self.document(checksum), location, copies)
    }

    /// Record a document that has been written to the store.
    pub fn commit(&mut self, checksum: Checksum, document: FileCopies) {
        self.committed.insert(checksum, document);
    }

    /// Documents committed so far.
    pub fn committed(&self) -> usize {
        self.committed.len()
    }

    /// Every file known to the master index with its current document.
    pub fn iter(&self) -> impl Iterator<Item = (&Checksum, i64, &FileCopies)> {
        self.master.iter().map(|(checksum, entry)| {
            let document = self.committed.get(checksum).unwrap_or(&entry.copies);
            (checksum, entry.file_id, document)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

    fn doc(entries: &[(&str, &str)]) -> FileCopies {
        let mut copies = FileCopies::new();
        for (location, path) in entries {
            let mut list = copies.get(location).map(<[_]>::to_vec).unwrap_or_default();
            list.push(PhysicalCopy::new(*path, 1, 2));
            copies.set(*location, list);
        }
        copies
    }

    #[test]
    fn test_merge_preserves_other_locations() {
        let current = doc(&[("loc1", "/a"), ("loc2", "/b")]);
        let merged = merge(Some(&current), "loc1", vec![PhysicalCopy::new("/c", 1, 2)]);
        assert_eq!(merged, doc(&[("loc1", "/c"), ("loc2", "/b")]));
        // Metadata of the untouched location survives too.
        assert_eq!(merged.get("loc2").unwrap()[0].size, 1);
    }

    #[test]
    fn test_merge_empty_removes_location() {
        let current = doc(&[("loc1", "/a"), ("loc2", "/b")]);
        let merged = merge(Some(&current), "loc1", vec![]);
        assert_eq!(merged.locations().collect::<Vec<_>>(), vec!["loc2"]);
        assert!(merge(Some(&merged), "loc2", vec![]).is_empty());
    }

    #[test]
    fn test_merge_into_nothing() {
        let merged = merge(None, "loc", vec![PhysicalCopy::new("/a", 1, 2)]);
        assert_eq!(merged, doc(&[("loc", "/a")]));
    }

    #[test]
    fn test_committed_documents_shadow_master() {
        let checksum: Checksum = A.parse().unwrap();
        let mut master = MasterIndex::with_capacity(1);
        master.insert(checksum, 7, doc(&[("loc1", "/a")]));
        let mut base = MergeBase::new(&master);

        let first = base.merged(&checksum, "loc2", vec![PhysicalCopy::new("/b", 1, 2)]);
        base.commit(checksum, first);
        let second = base.merged(&checksum, "loc3", vec![PhysicalCopy::new("/c", 1, 2)]);
        assert_eq!(second, doc(&[("loc1", "/a"), ("loc2", "/b"), ("loc3", "/c")]));

        let (_, file_id, current) = base.iter().next().unwrap();
        assert_eq!(file_id, 7);
        assert_eq!(current, &doc(&[("loc1", "/a"), ("loc2", "/b")]));
        assert_eq!(base.committed(), 1);
    }
}
