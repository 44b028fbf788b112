//! Batch Applier.
//!
//! Turns a [`Diff`] for one location into fully merged storage documents and
//! writes them, either all at once through a staging table or one file at a
//! time through a small worker pool. Every document written is committed to
//! the [`MergeBase`] so later locations build on it.

pub mod error;
mod pool;

use crate::apply::error::{ErrorKind, Result};
use crate::apply::pool::Unit;
use crate::diff::Diff;
use crate::merge::MergeBase;
use archivist_catalog::{Repository, StagedDocument};
use archivist_config::ApplyMode;
use archivist_inventory::Checksum;
use exn::ResultExt;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

/// Outcome of applying one diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Checksums in the diff.
    pub changed: u64,
    /// Documents handed to the store.
    pub staged: u64,
    /// File rows actually rewritten.
    pub updated: u64,
    /// Checksums with no matching file row.
    pub unresolved: u64,
    /// Files that could not be written.
    pub failed: u64,
}

/// Write every change in `diff`, merged over what `base` currently holds.
#[instrument(skip_all, fields(location = diff.location(), changes = diff.len(), ?mode))]
pub async fn apply(
    repo: &Repository,
    base: &mut MergeBase<'_>,
    diff: &Diff,
    mode: ApplyMode,
    workers: usize,
) -> Result<ApplyReport> {
    let mut report = ApplyReport {
        changed: diff.len() as u64,
        ..ApplyReport::default()
    };
    if diff.is_empty() {
        debug!("Nothing to apply");
        return Ok(report);
    }
    match mode {
        ApplyMode::Staged => apply_staged(repo, base, diff, &mut report).await?,
        ApplyMode::PerFile => apply_per_file(repo, base, diff, workers, &mut report).await?,
    }
    if report.unresolved > 0 {
        info!(
            location = diff.location(),
            unresolved = report.unresolved,
            "Snapshot lists checksums with no matching file"
        );
    }
    Ok(report)
}

async fn apply_staged(repo: &Repository, base: &mut MergeBase<'_>, diff: &Diff, report: &mut ApplyReport) -> Result<()> {
    let location = diff.location();
    let mut documents = Vec::with_capacity(diff.len());
    for (checksum, copies) in diff.iter() {
        if base.master().file_id(checksum).is_none() {
            report.unresolved += 1;
            continue;
        }
        documents.push(StagedDocument {
            checksum: *checksum,
            copies: base.merged(checksum, location, copies.clone()),
        });
    }

    let applied = repo.apply_staged(&documents).await.or_raise(|| ErrorKind::Store)?;
    report.staged = applied.staged;
    report.updated = applied.affected;

    // Rows the update skipped (unreadable properties) keep their old document.
    let written: HashSet<Checksum> = applied.written.into_iter().collect();
    let mut unwritten = 0;
    for document in documents {
        if written.contains(&document.checksum) {
            base.commit(document.checksum, document.copies);
        } else {
            warn!(location, checksum = %document.checksum, "File was not updated, its properties are unreadable");
            unwritten += 1;
        }
    }
    report.failed += unwritten;
    Ok(())
}

async fn apply_per_file(
    repo: &Repository,
    base: &mut MergeBase<'_>,
    diff: &Diff,
    workers: usize,
    report: &mut ApplyReport,
) -> Result<()> {
    let location = diff.location();
    let mut units = Vec::with_capacity(diff.len());
    for (checksum, copies) in diff.iter() {
        let Some(file_id) = base.master().file_id(checksum) else {
            report.unresolved += 1;
            continue;
        };
        units.push(Unit {
            file_id,
            checksum: *checksum,
            copies: copies.clone(),
        });
    }
    report.staged = units.len() as u64;

    let tally = pool::run(repo, location, units, workers).await?;
    report.updated = tally.updated.len() as u64;
    report.failed = tally.failed;
    if tally.missing > 0 {
        warn!(location, missing = tally.missing, "Some files were removed during the run");
    }
    for checksum in tally.updated {
        let copies = diff.get(&checksum).map(<[_]>::to_vec).unwrap_or_default();
        let document = base.merged(&checksum, location, copies);
        base.commit(checksum, document);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use archivist_catalog::Database;
    use archivist_inventory::{FileCopies, PhysicalCopy};
    use rstest::rstest;

    const A: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";
    const B: &str = "0123456789abcdef0123456789abcdef01234567";
    const UNKNOWN: &str = "89abcdef0123456789abcdef0123456789abcdef";

    fn sum(hex: &str) -> Checksum {
        hex.parse().unwrap()
    }

    fn copies(location: &str, paths: &[&str]) -> FileCopies {
        let mut doc = FileCopies::new();
        doc.set(location, paths.iter().map(|p| PhysicalCopy::new(*p, 1, 2)).collect());
        doc
    }

    /// Two files: A at loc1 and loc2, B at loc1 only.
    async fn seeded() -> (Database, Repository, i64, i64) {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let mut a = copies("loc1", &["/a"]);
        a.set("loc2", vec![PhysicalCopy::new("/a2", 1, 2)]);
        let a_json = format!(r#"{{"storage":{}}}"#, a.to_json().unwrap());
        let b_json = format!(r#"{{"storage":{},"title":"kept"}}"#, copies("loc1", &["/b"]).to_json().unwrap());
        let a_id = repo.insert_file("a", "a", Some(sum(A)), Some(1), &a_json).await.unwrap();
        let b_id = repo.insert_file("b", "b", Some(sum(B)), Some(1), &b_json).await.unwrap();
        (db, repo, a_id, b_id)
    }

    #[rstest]
    #[case(ApplyMode::Staged)]
    #[case(ApplyMode::PerFile)]
    #[tokio::test]
    async fn test_apply_merges_and_clears(#[case] mode: ApplyMode) {
        let (_db, repo, a_id, b_id) = seeded().await;
        let master = repo.load_master().await.unwrap();
        let mut base = MergeBase::new(&master);

        let mut diff = Diff::new("loc1");
        diff.insert(sum(A), vec![PhysicalCopy::new("/a", 1, 2), PhysicalCopy::new("/new", 1, 2)]);
        diff.insert(sum(B), vec![]);
        diff.insert(sum(UNKNOWN), vec![PhysicalCopy::new("/u", 1, 2)]);

        let report = apply(&repo, &mut base, &diff, mode, 3).await.unwrap();
        assert_eq!(
            report,
            ApplyReport {
                changed: 3,
                staged: 2,
                updated: 2,
                unresolved: 1,
                failed: 0,
            }
        );

        let mut expected = copies("loc1", &["/a", "/new"]);
        expected.set("loc2", vec![PhysicalCopy::new("/a2", 1, 2)]);
        assert_eq!(repo.storage(a_id).await.unwrap(), Some(expected.clone()));
        assert_eq!(base.document(&sum(A)), Some(&expected));

        // B's only location went away, so the attribute is gone entirely.
        assert_eq!(repo.storage(b_id).await.unwrap(), None);
        let properties = repo.properties(b_id).await.unwrap().unwrap();
        assert!(!properties.contains("storage"));
        assert!(properties.contains("kept"));
    }

    #[rstest]
    #[case(ApplyMode::Staged)]
    #[case(ApplyMode::PerFile)]
    #[tokio::test]
    async fn test_later_location_builds_on_earlier(#[case] mode: ApplyMode) {
        let (_db, repo, a_id, _) = seeded().await;
        let master = repo.load_master().await.unwrap();
        let mut base = MergeBase::new(&master);

        let mut first = Diff::new("loc1");
        first.insert(sum(A), vec![]);
        apply(&repo, &mut base, &first, mode, 1).await.unwrap();
        let mut second = Diff::new("loc3");
        second.insert(sum(A), vec![PhysicalCopy::new("/c", 1, 2)]);
        apply(&repo, &mut base, &second, mode, 1).await.unwrap();

        let mut expected = copies("loc2", &["/a2"]);
        expected.set("loc3", vec![PhysicalCopy::new("/c", 1, 2)]);
        assert_eq!(repo.storage(a_id).await.unwrap(), Some(expected));
    }

    #[rstest]
    #[case(ApplyMode::Staged)]
    #[case(ApplyMode::PerFile)]
    #[tokio::test]
    async fn test_unreadable_properties_are_not_committed(#[case] mode: ApplyMode) {
        let (_db, repo, a_id, _) = seeded().await;
        let corrupt = repo.insert_file("c", "c", Some(sum(UNKNOWN)), Some(1), "{oops").await.unwrap();
        let master = repo.load_master().await.unwrap();
        let mut base = MergeBase::new(&master);

        let mut diff = Diff::new("loc1");
        diff.insert(sum(A), vec![]);
        diff.insert(sum(UNKNOWN), vec![PhysicalCopy::new("/u", 1, 2)]);
        let report = apply(&repo, &mut base, &diff, mode, 2).await.unwrap();

        assert_eq!((report.staged, report.updated, report.failed), (2, 1, 1));
        assert_eq!(base.committed(), 1);
        assert!(base.document(&sum(UNKNOWN)).unwrap().is_empty());
        assert_eq!(repo.properties(corrupt).await.unwrap().unwrap(), "{oops");
        assert_eq!(repo.storage(a_id).await.unwrap(), Some(copies("loc2", &["/a2"])));
    }

    #[tokio::test]
    async fn test_empty_diff_writes_nothing() {
        let (_db, repo, _, _) = seeded().await;
        let master = repo.load_master().await.unwrap();
        let mut base = MergeBase::new(&master);
        let report = apply(&repo, &mut base, &Diff::new("loc1"), ApplyMode::Staged, 1)
            .await
            .unwrap();
        assert_eq!(report, ApplyReport::default());
        assert_eq!(base.committed(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_leaves_store_untouched() {
        let (db, _, a_id, _) = seeded().await;
        let repo = Repository::from(&db).with_dry_run(true);
        let master = repo.load_master().await.unwrap();
        let mut base = MergeBase::new(&master);
        let mut diff = Diff::new("loc1");
        diff.insert(sum(A), vec![]);

        let report = apply(&repo, &mut base, &diff, ApplyMode::Staged, 1).await.unwrap();
        assert_eq!(report.updated, 1);
        assert!(repo.storage(a_id).await.unwrap().unwrap().get("loc1").is_some());
    }
}
