use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Availability of a storage device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum DeviceStatus {
    Online,
    Nearline,
    Offline,
}
impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Nearline => "nearline",
            Self::Offline => "offline",
        }
    }
}
impl FromStr for DeviceStatus {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The storage API has reported both "ONLINE" and "online" over time.
        match s.to_ascii_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "nearline" => Ok(Self::Nearline),
            "offline" => Ok(Self::Offline),
            _ => exn::bail!(ErrorKind::ParseError {
                field: "status",
                value: s.to_string(),
            }),
        }
    }
}
impl TryFrom<String> for DeviceStatus {
    type Error = Error;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
impl From<DeviceStatus> for &'static str {
    fn from(status: DeviceStatus) -> Self {
        status.as_str()
    }
}
impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named physical or logical storage backend that can hold file copies.
///
/// The name is the location key used in every file's `storage` document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageDevice {
    pub name: String,
    pub country: String,
    /// Where the device physically lives (site, data centre, shelf).
    pub location: String,
    pub status: DeviceStatus,
    pub access: String,
}
