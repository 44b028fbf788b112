//! Storage inventory reconciliation.
//!
//! Each run syncs the device catalog, loads the master index, then for every
//! location downloads and parses its snapshot, diffs it against the master
//! index and applies the changes. Files no location confirmed are cleared at
//! the end. See [`Engine::run`].

pub mod apply;
pub mod devices;
mod diff;
pub mod error;
mod merge;
pub mod orphans;
mod run;
pub mod scratch;

pub use crate::apply::{ApplyReport, apply};
pub use crate::diff::{Diff, diff};
pub use crate::merge::{MergeBase, merge};
pub use crate::run::{Engine, RunReport};
use archivist_config::{ApplyMode, Config};
use archivist_inventory::LineFormat;
use std::path::PathBuf;

/// Settings a run needs, taken from [`Config`].
#[derive(Debug, Clone)]
pub struct Context {
    pub scratch_dir: PathBuf,
    pub format: LineFormat,
    pub apply: ApplyMode,
    pub workers: usize,
    pub page_size: usize,
    /// Restrict the run to these locations. Empty means every catalogued device.
    pub locations: Vec<String>,
}

impl Context {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            format: LineFormat::default(),
            apply: ApplyMode::default(),
            workers: 5,
            page_size: 1000,
            locations: Vec::new(),
        }
    }
}

impl From<&Config> for Context {
    fn from(config: &Config) -> Self {
        Self {
            scratch_dir: config.scratch_dir.clone(),
            format: config.format,
            apply: config.apply,
            workers: config.workers,
            page_size: config.page_size,
            locations: config.locations.clone(),
        }
    }
}
