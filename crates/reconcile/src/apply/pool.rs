use crate::apply::error::{ErrorKind, Result};
use archivist_catalog::Repository;
use archivist_inventory::{Checksum, PhysicalCopy};
use exn::ResultExt;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use tracing::{debug, warn};

/// One file's new copy list for the location being applied.
#[derive(Debug, Clone)]
pub(crate) struct Unit {
    pub file_id: i64,
    pub checksum: Checksum,
    pub copies: Vec<PhysicalCopy>,
}

/// What the workers did with the units they were handed.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    /// Checksums whose file row was rewritten.
    pub updated: Vec<Checksum>,
    /// File rows that disappeared between loading and applying.
    pub missing: u64,
    pub failed: u64,
}
impl Tally {
    fn absorb(&mut self, other: Tally) {
        self.updated.extend(other.updated);
        self.missing += other.missing;
        self.failed += other.failed;
    }
}

/// Apply `units` with `workers` tasks pulling from a bounded queue.
///
/// Each unit is written in its own transaction. A failed unit is logged with
/// its file id and counted; it does not stop the other workers. Returns once
/// the queue is drained and every worker has exited.
pub(crate) async fn run(repo: &Repository, location: &str, units: Vec<Unit>, workers: usize) -> Result<Tally> {
    let workers = workers.max(1);
    let (tx, rx) = flume::bounded::<Unit>(workers * 2);
    let location: Arc<str> = Arc::from(location);

    let mut handles = FuturesUnordered::new();
    for worker in 0..workers {
        let rx = rx.clone();
        let repo = repo.clone();
        let location = Arc::clone(&location);
        handles.push(tokio::spawn(async move {
            let mut tally = Tally::default();
            while let Ok(unit) = rx.recv_async().await {
                match repo.update_file_location(unit.file_id, &location, &unit.copies).await {
                    Ok(true) => tally.updated.push(unit.checksum),
                    Ok(false) => {
                        warn!(%location, file_id = unit.file_id, "File row vanished before it could be updated");
                        tally.missing += 1;
                    },
                    Err(err) => {
                        warn!(%location, file_id = unit.file_id, error = ?err, "Failed to update file");
                        tally.failed += 1;
                    },
                }
            }
            debug!(%location, worker, updated = tally.updated.len(), "Worker finished");
            tally
        }));
    }
    drop(rx);

    for unit in units {
        // Only fails once every receiver is gone, i.e. every worker has died.
        if tx.send_async(unit).await.is_err() {
            break;
        }
    }
    drop(tx);

    let mut total = Tally::default();
    let mut lost = None;
    while let Some(joined) = handles.next().await {
        match joined {
            Ok(tally) => total.absorb(tally),
            Err(err) => lost = Some(err),
        }
    }
    if let Some(err) = lost {
        return Err(err).or_raise(|| ErrorKind::Worker);
    }
    Ok(total)
}
