mod checksum;
mod copy;
mod device;

pub use self::checksum::{CHECKSUM_LEN, Checksum};
pub use self::copy::{FileCopies, PhysicalCopy, same_paths};
pub use self::device::{DeviceStatus, StorageDevice};
