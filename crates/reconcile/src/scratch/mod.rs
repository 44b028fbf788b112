//! Scratch directory for downloaded snapshots.
//!
//! Every location gets its own subdirectory, named after the location, and
//! every run writes `index_<unix timestamp>.txt` into it. Once a run has
//! finished, [`Scratch::purge`] removes every snapshot the run did not write.

pub mod error;

use crate::scratch::error::{ErrorKind, Result};
use exn::ResultExt;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use time::UtcDateTime;
use tracing::{debug, warn};

/// Check that a location name is a single, plain path component.
///
/// Location names come from the device listing and end up as directory
/// names, so separators, `.`/`..` and NUL bytes are all rejected.
pub fn validate_location(location: &str) -> Result<()> {
    let invalid = || ErrorKind::InvalidLocation(location.to_string());
    if location.contains('\0') {
        exn::bail!(invalid());
    }
    let mut components = Path::new(location).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == location => Ok(()),
        _ => exn::bail!(invalid()),
    }
}

#[derive(Debug)]
pub struct Scratch {
    root: PathBuf,
    stamp: i64,
    created: HashSet<PathBuf>,
}

impl Scratch {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_stamp(root, UtcDateTime::now().unix_timestamp())
    }

    pub fn with_stamp(root: impl Into<PathBuf>, stamp: i64) -> Self {
        Self {
            root: root.into(),
            stamp,
            created: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the location's directory and return the path this run's
    /// snapshot for it should be downloaded to.
    pub async fn prepare(&mut self, location: &str) -> Result<PathBuf> {
        validate_location(location)?;
        let dir = self.root.join(location);
        tokio::fs::create_dir_all(&dir).await.or_raise(|| ErrorKind::Io(dir.clone()))?;
        let path = dir.join(format!("index_{}.txt", self.stamp));
        self.created.insert(path.clone());
        Ok(path)
    }

    /// Delete every file under the scratch root that this run did not write:
    /// old snapshots in location directories, and stray files left directly
    /// in the root by older single-directory layouts.
    ///
    /// Failing to list the root or a location directory is an error; failing
    /// to delete a single file is only logged. Returns the number removed.
    pub async fn purge(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err).or_raise(|| ErrorKind::Io(self.root.clone())),
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.or_raise(|| ErrorKind::Io(self.root.clone()))? {
            let path = entry.path();
            if !path.is_dir() {
                removed += self.remove_stale(&path).await;
                continue;
            }
            let mut files = tokio::fs::read_dir(&path).await.or_raise(|| ErrorKind::Io(path.clone()))?;
            while let Some(file) = files.next_entry().await.or_raise(|| ErrorKind::Io(path.clone()))? {
                let file = file.path();
                if !file.is_dir() {
                    removed += self.remove_stale(&file).await;
                }
            }
        }
        Ok(removed)
    }

    /// Remove `path` unless this run wrote it. Returns 1 if it was removed.
    async fn remove_stale(&self, path: &Path) -> usize {
        if self.created.contains(path) {
            return 0;
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed old snapshot");
                1
            },
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to remove old snapshot");
                0
            },
        }
    }
}
