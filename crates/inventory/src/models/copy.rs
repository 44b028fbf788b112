use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::hash::{Hash, Hasher};

/// One instance of a file's bytes at one storage location.
///
/// Identity is the path: two copies at the same path are the same copy even
/// if the reported size or modification time differ. Those are informational
/// and never cause a copy to be considered new.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalCopy {
    pub path: String,
    pub size: i64,
    /// Last modification, as a Unix timestamp in seconds.
    #[serde(rename = "mod_time")]
    pub modified_at: i64,
}
impl PhysicalCopy {
    pub fn new(path: impl Into<String>, size: i64, modified_at: i64) -> Self {
        Self {
            path: path.into(),
            size,
            modified_at,
        }
    }
}
impl PartialEq for PhysicalCopy {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}
impl Eq for PhysicalCopy {}
impl Hash for PhysicalCopy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

/// Compare two copy lists as sets of paths.
///
/// Order and duplicates are irrelevant, as are size and modification time.
pub fn same_paths(a: &[PhysicalCopy], b: &[PhysicalCopy]) -> bool {
    match (a, b) {
        ([], []) => true,
        ([x], [y]) => x.path == y.path,
        _ => {
            let a: HashSet<&str> = a.iter().map(|c| c.path.as_str()).collect();
            let b: HashSet<&str> = b.iter().map(|c| c.path.as_str()).collect();
            a == b
        },
    }
}

/// Every known copy of one file, grouped by location name.
///
/// This is the shape of a file's persisted `storage` attribute. Ordered by
/// location so that the encoded document is stable between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileCopies(BTreeMap<String, Vec<PhysicalCopy>>);

impl FileCopies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, location: &str) -> Option<&[PhysicalCopy]> {
        self.0.get(location).map(Vec::as_slice)
    }

    /// Replace the copies recorded for `location`. An empty list removes the
    /// location key entirely rather than storing an empty array.
    pub fn set(&mut self, location: impl Into<String>, copies: Vec<PhysicalCopy>) {
        let location = location.into();
        if copies.is_empty() {
            self.0.remove(&location);
        } else {
            self.0.insert(location, copies);
        }
    }

    pub fn remove(&mut self, location: &str) -> Option<Vec<PhysicalCopy>> {
        self.0.remove(location)
    }

    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[PhysicalCopy])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// `true` when no location holds a copy.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let mut copies: Self = serde_json::from_str(json)?;
        // An empty array and a missing key mean the same thing.
        copies.0.retain(|_, v| !v.is_empty());
        Ok(copies)
    }
}
impl FromIterator<(String, Vec<PhysicalCopy>)> for FileCopies {
    fn from_iter<T: IntoIterator<Item = (String, Vec<PhysicalCopy>)>>(iter: T) -> Self {
        let mut copies = Self::new();
        for (location, list) in iter {
            copies.set(location, list);
        }
        copies
    }
}
