//! Inventory models and the location snapshot parser.
//!
//! Everything in this crate is pure: no store, no network. It defines what a
//! file copy *is* ([`PhysicalCopy`]), how copies are grouped per file
//! ([`FileCopies`], the persisted `storage` document), the storage devices
//! that hold them, and how one location's flat-file snapshot is read into a
//! [`LocationIndex`].

pub mod error;
mod index;
pub mod models;
mod parse;

pub use crate::index::{LocationIndex, ParseStats, parse_snapshot, read_snapshot};
pub use crate::models::{CHECKSUM_LEN, Checksum, DeviceStatus, FileCopies, PhysicalCopy, StorageDevice, same_paths};
pub use crate::parse::{LineFormat, parse_line};
