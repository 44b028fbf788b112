//! SQLite file catalog.
//!
//! Holds the durable belief about where copies live: every file row carries a
//! JSON `properties` document whose `storage` key maps location names to the
//! copies found there. This crate loads that belief into a [`MasterIndex`],
//! writes new documents back in bulk through a staging table, clears
//! documents page by page, and keeps the `storages` device table.

mod db;
pub mod error;
mod master;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::master::{MasterEntry, MasterIndex};
pub use crate::models::{DeviceChanges, StagedApply, StagedDocument};
pub use crate::repo::Repository;
