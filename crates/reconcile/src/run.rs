use crate::Context;
use crate::apply::{ApplyReport, apply};
use crate::devices;
use crate::diff::diff;
use crate::error::{ErrorKind, Result};
use crate::merge::MergeBase;
use crate::orphans;
use crate::scratch::{Scratch, validate_location};
use archivist_catalog::{MasterIndex, Repository};
use archivist_inventory::{Checksum, LocationIndex, ParseStats, StorageDevice, read_snapshot};
use archivist_source::SourceHandle;
use exn::ResultExt;
use std::collections::HashSet;
use std::fmt;
use tracing::{info, instrument, warn};

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Locations whose snapshot was applied.
    pub locations: u64,
    /// Locations requested but not processed.
    pub skipped_locations: u64,
    pub parsed: u64,
    pub skipped_lines: u64,
    pub changed: u64,
    pub updated: u64,
    pub unresolved: u64,
    /// Files that could not be written and were left as they were.
    pub failed: u64,
    /// Whether every catalogued device was processed and orphans cleared.
    pub orphan_pass: bool,
    pub cleared: u64,
    /// Files that lost a reference to a device no longer in the catalog.
    pub pruned: u64,
    /// Old snapshots removed from the scratch directory.
    pub purged: u64,
}
impl RunReport {
    fn add(&mut self, applied: &ApplyReport) {
        self.changed += applied.changed;
        self.updated += applied.updated;
        self.unresolved += applied.unresolved;
        self.failed += applied.failed;
    }

    /// Everything that was skipped or failed without stopping the run.
    pub fn skipped(&self) -> u64 {
        self.skipped_locations + self.skipped_lines + self.failed
    }
}
impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} locations processed, {} files parsed, {} changed, {} updated, {} cleared, {} errors skipped",
            self.locations,
            self.parsed,
            self.changed,
            self.updated,
            self.cleared + self.pruned,
            self.skipped(),
        )
    }
}

/// Runs the reconciliation phases against one store and one source.
pub struct Engine {
    repo: Repository,
    source: SourceHandle,
    ctx: Context,
}

impl Engine {
    pub fn new(repo: Repository, source: SourceHandle, ctx: Context) -> Self {
        Self { repo, source, ctx }
    }

    /// One complete run.
    ///
    /// Phases run strictly in order: device sync, master index load, each
    /// location in turn, the orphan pass, scratch cleanup. A phase error ends
    /// the run; whatever was committed before it stays committed.
    #[instrument(skip_all, fields(source = self.source.name(), dry_run = self.repo.is_dry_run()))]
    pub async fn run(&self) -> Result<RunReport> {
        let mut report = RunReport::default();

        let devices = devices::sync(&self.repo, &self.source).await?;
        let master = self.repo.load_master().await.or_raise(|| ErrorKind::LoadMaster)?;
        info!(devices = devices.len(), files = master.len(), "Master index loaded");

        let catalog: HashSet<&str> = devices.iter().map(|d| d.name.as_str()).collect();
        let targets = self.targets(&devices, &mut report);

        let mut base = MergeBase::new(&master);
        let mut scratch = Scratch::new(&self.ctx.scratch_dir);
        let mut confirmed: HashSet<Checksum> = HashSet::with_capacity(master.len());
        let mut processed: HashSet<&str> = HashSet::with_capacity(targets.len());

        for location in targets {
            let Some(index) = self.fetch(&mut scratch, &master, location, &mut report).await? else {
                report.skipped_locations += 1;
                continue;
            };
            let changes = diff(&master, &index);
            confirmed.extend(index.iter().map(|(checksum, _)| *checksum));
            drop(index);

            let applied = apply(&self.repo, &mut base, &changes, self.ctx.apply, self.ctx.workers)
                .await
                .or_raise(|| ErrorKind::Apply(location.to_string()))?;
            info!(
                location,
                changed = applied.changed,
                updated = applied.updated,
                unresolved = applied.unresolved,
                failed = applied.failed,
                "Location applied"
            );
            report.add(&applied);
            report.locations += 1;
            processed.insert(location);
        }

        if processed.is_empty() {
            warn!("No location was processed, skipping orphan reconciliation");
        } else {
            self.reconcile_orphans(&mut base, &catalog, &processed, &confirmed, &mut report)
                .await?;
        }

        report.purged = scratch.purge().await.or_raise(|| ErrorKind::Cleanup)? as u64;
        info!(
            locations = report.locations,
            parsed = report.parsed,
            changed = report.changed,
            updated = report.updated,
            cleared = report.cleared,
            skipped = report.skipped(),
            "{report}"
        );
        Ok(report)
    }

    /// Locations to process this run, in name order.
    fn targets<'d>(&self, devices: &'d [StorageDevice], report: &mut RunReport) -> Vec<&'d str> {
        if self.ctx.locations.is_empty() {
            return devices.iter().map(|d| d.name.as_str()).collect();
        }
        let mut targets = Vec::with_capacity(self.ctx.locations.len());
        for wanted in &self.ctx.locations {
            match devices.iter().find(|d| &d.name == wanted) {
                Some(device) => targets.push(device.name.as_str()),
                None => {
                    warn!(location = %wanted, "Location is not in the device catalog, skipping");
                    report.skipped_locations += 1;
                },
            }
        }
        targets
    }

    /// Download and parse one location's snapshot. `None` when the location
    /// has to be skipped.
    async fn fetch(
        &self,
        scratch: &mut Scratch,
        master: &MasterIndex,
        location: &str,
        report: &mut RunReport,
    ) -> Result<Option<LocationIndex>> {
        if let Err(err) = validate_location(location) {
            warn!(location, error = ?err, "Location name cannot be used on disk, skipping");
            return Ok(None);
        }
        let path = scratch
            .prepare(location)
            .await
            .or_raise(|| ErrorKind::Download(location.to_string()))?;
        let bytes = self
            .source
            .download(location, &path)
            .await
            .or_raise(|| ErrorKind::Download(location.to_string()))?;

        let format = self.ctx.format;
        let owned = location.to_string();
        let (index, stats): (LocationIndex, ParseStats) =
            tokio::task::spawn_blocking(move || read_snapshot(&path, &owned, format))
                .await
                .or_raise(|| ErrorKind::Parse(location.to_string()))?
                .or_raise(|| ErrorKind::Parse(location.to_string()))?;
        report.parsed += stats.parsed as u64;
        report.skipped_lines += stats.skipped() as u64;
        info!(location, bytes, files = index.len(), skipped = stats.skipped(), "Snapshot parsed");

        if index.is_empty() && master.has_location(location) {
            warn!(location, "Snapshot is empty but the catalog records copies there, skipping");
            return Ok(None);
        }
        Ok(Some(index))
    }

    async fn reconcile_orphans(
        &self,
        base: &mut MergeBase<'_>,
        catalog: &HashSet<&str>,
        processed: &HashSet<&str>,
        confirmed: &HashSet<Checksum>,
        report: &mut RunReport,
    ) -> Result<()> {
        let mut cleared: HashSet<i64> = HashSet::new();
        if catalog.iter().all(|name| processed.contains(name)) {
            let candidates = orphans::candidates(base, confirmed);
            let outcome = orphans::clear(&self.repo, &candidates, self.ctx.page_size).await;
            if outcome.failed > 0 {
                warn!(failed_pages = outcome.failed_pages, failed = outcome.failed, "Some orphans were not cleared");
            }
            info!(candidates = outcome.candidates, cleared = outcome.cleared, "Orphans cleared");
            report.orphan_pass = true;
            report.cleared = outcome.cleared;
            report.failed += outcome.failed;
            cleared.extend(candidates);
        } else {
            warn!("Not every catalogued device was processed, skipping orphan clearing");
        }

        for location in orphans::stale_locations(base, catalog) {
            let changes = orphans::stale_diff(base, &location, &cleared);
            let applied = apply(&self.repo, base, &changes, self.ctx.apply, self.ctx.workers)
                .await
                .or_raise(|| ErrorKind::Orphans)?;
            info!(location, pruned = applied.updated, "Removed references to a retired device");
            report.pruned += applied.updated;
            report.failed += applied.failed;
        }
        Ok(())
    }
}
