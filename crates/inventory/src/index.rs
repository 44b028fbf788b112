use crate::error::{ErrorKind, LineError, ParseError, Result};
use crate::models::{Checksum, PhysicalCopy};
use crate::parse::{LineFormat, parse_line};
use exn::ResultExt;
use std::collections::HashMap;
use std::collections::hash_map;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, instrument, warn};

/// Rough average length of one snapshot line, used to pre-size the index.
const AVG_LINE_BYTES: u64 = 110;
/// Upper bound on pre-allocation, whatever the file claims its size is.
const MAX_PRESIZE: usize = 4_000_000;

/// One location's self-reported listing: every copy it holds, by checksum.
///
/// Rebuilt from scratch on every run and dropped once it has been diffed.
#[derive(Debug, Clone, Default)]
pub struct LocationIndex {
    location: String,
    entries: HashMap<Checksum, Vec<PhysicalCopy>>,
}

impl LocationIndex {
    pub fn new(location: impl Into<String>) -> Self {
        Self::with_capacity(location, 0)
    }

    pub fn with_capacity(location: impl Into<String>, capacity: usize) -> Self {
        Self {
            location: location.into(),
            entries: HashMap::with_capacity(capacity),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Record a copy. Returns `false` if this checksum already had a copy at
    /// the same path, in which case the index is unchanged.
    pub fn insert(&mut self, checksum: Checksum, copy: PhysicalCopy) -> bool {
        let copies = self.entries.entry(checksum).or_default();
        if copies.iter().any(|c| c.path == copy.path) {
            return false;
        }
        copies.push(copy);
        true
    }

    /// Copies reported for `checksum`; empty when it was not reported.
    pub fn get(&self, checksum: &Checksum) -> &[PhysicalCopy] {
        self.entries.get(checksum).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, checksum: &Checksum) -> bool {
        self.entries.contains_key(checksum)
    }

    /// Number of distinct checksums.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, Checksum, Vec<PhysicalCopy>> {
        self.entries.iter()
    }
}

/// Counters gathered while reading a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Every line read, blank ones included.
    pub lines: usize,
    pub blank: usize,
    /// Lines that produced a copy (duplicates included).
    pub parsed: usize,
    /// Lines rejected for being malformed or not UTF-8.
    pub bad_lines: usize,
    /// Well-formed lines whose checksum was not a valid digest.
    pub invalid_checksums: usize,
}
impl ParseStats {
    /// Lines that were read but did not contribute to the index.
    pub fn skipped(&self) -> usize {
        self.bad_lines + self.invalid_checksums
    }
}

/// Read a snapshot file from disk into a [`LocationIndex`].
///
/// Bad lines are logged and counted, never fatal; only failing to open or
/// read the file is. This is blocking I/O and CPU heavy for large snapshots,
/// callers in async code should run it on the blocking pool.
#[instrument(level = "debug", skip(path, format))]
pub fn read_snapshot(
    path: impl AsRef<Path>,
    location: &str,
    format: LineFormat,
) -> Result<(LocationIndex, ParseStats)> {
    let path = path.as_ref();
    let file = File::open(path).or_raise(|| ErrorKind::Open(path.to_path_buf()))?;
    let capacity = file
        .metadata()
        .map(|m| usize::try_from(m.len() / AVG_LINE_BYTES).unwrap_or(MAX_PRESIZE).min(MAX_PRESIZE))
        .unwrap_or_default();
    parse_snapshot(BufReader::new(file), location, format, capacity)
}

/// Parse a snapshot from any buffered reader.
pub fn parse_snapshot<R: BufRead>(
    mut reader: R,
    location: &str,
    format: LineFormat,
    capacity: usize,
) -> Result<(LocationIndex, ParseStats)> {
    let mut index = LocationIndex::with_capacity(location, capacity);
    let mut stats = ParseStats::default();
    let mut buf = Vec::with_capacity(512);

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).or_raise(|| ErrorKind::Io)? == 0 {
            break;
        }
        stats.lines += 1;

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(_) => {
                stats.bad_lines += 1;
                report(location, stats.lines, LineError::Encoding);
                continue;
            },
        };
        if line.is_empty() {
            stats.blank += 1;
            continue;
        }

        match parse_line(line, format) {
            Ok((checksum, copy)) => {
                stats.parsed += 1;
                index.insert(checksum, copy);
            },
            Err(kind @ LineError::InvalidChecksum(_)) => {
                stats.invalid_checksums += 1;
                report(location, stats.lines, kind);
            },
            Err(kind) => {
                stats.bad_lines += 1;
                report(location, stats.lines, kind);
            },
        }
    }

    debug!(
        location,
        files = index.len(),
        lines = stats.lines,
        blank = stats.blank,
        bad_lines = stats.bad_lines,
        invalid_checksums = stats.invalid_checksums,
        "Snapshot read"
    );
    Ok((index, stats))
}

fn report(location: &str, line: usize, kind: LineError) {
    let err = ParseError { line, kind };
    warn!(location, line, error = %err, "Skipping bad snapshot line");
}
