//! Orphan Reconciler.
//!
//! Runs after every location has been applied. A file the catalog believed
//! to have copies, that no snapshot confirmed during the run, no longer lives
//! anywhere and has its `storage` attribute cleared. Files that were
//! confirmed but still point at a device that has left the catalog lose that
//! one location key.

use crate::diff::Diff;
use crate::merge::MergeBase;
use archivist_catalog::Repository;
use archivist_inventory::Checksum;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, instrument, warn};

/// Outcome of clearing orphaned files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrphanReport {
    pub candidates: u64,
    pub cleared: u64,
    /// Pages whose transaction failed; their files were left as they were.
    pub failed_pages: u64,
    pub failed: u64,
}

/// File ids of every file that still records a copy somewhere but whose
/// checksum was not in `confirmed`. Sorted, so pages are stable.
pub fn candidates(base: &MergeBase<'_>, confirmed: &HashSet<Checksum>) -> Vec<i64> {
    let mut ids: Vec<i64> = base
        .iter()
        .filter(|(checksum, _, document)| !document.is_empty() && !confirmed.contains(*checksum))
        .map(|(_, file_id, _)| file_id)
        .collect();
    ids.sort_unstable();
    ids
}

/// Clear the storage attribute of `file_ids`, `page_size` ids per
/// transaction. A failed page is logged and counted; later pages still run.
#[instrument(skip_all, fields(candidates = file_ids.len(), page_size))]
pub async fn clear(repo: &Repository, file_ids: &[i64], page_size: usize) -> OrphanReport {
    let mut report = OrphanReport {
        candidates: file_ids.len() as u64,
        ..OrphanReport::default()
    };
    for (page, ids) in file_ids.chunks(page_size.max(1)).enumerate() {
        match repo.clear_storage(ids).await {
            Ok(cleared) => {
                debug!(page, cleared, "Orphan page cleared");
                report.cleared += cleared;
            },
            Err(err) => {
                warn!(
                    page,
                    first_file_id = ids.first().copied(),
                    files = ids.len(),
                    error = ?err,
                    "Failed to clear orphan page"
                );
                report.failed_pages += 1;
                report.failed += ids.len() as u64;
            },
        }
    }
    report
}

/// Locations still referenced by some file that are not in `catalog`.
pub fn stale_locations(base: &MergeBase<'_>, catalog: &HashSet<&str>) -> BTreeSet<String> {
    base.iter()
        .flat_map(|(_, _, document)| document.locations())
        .filter(|location| !catalog.contains(location))
        .map(str::to_string)
        .collect()
}

/// A diff removing `location` from every file that references it, except
/// those in `skip`.
pub fn stale_diff(base: &MergeBase<'_>, location: &str, skip: &HashSet<i64>) -> Diff {
    let mut diff = Diff::new(location);
    for (checksum, file_id, document) in base.iter() {
        if document.get(location).is_some() && !skip.contains(&file_id) {
            diff.insert(*checksum, vec![]);
        }
    }
    diff
}
