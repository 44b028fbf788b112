use crate::error::{Error, ErrorKind};
use std::fmt;
use std::str::FromStr;

/// Length of a SHA-1 digest in bytes.
pub const CHECKSUM_LEN: usize = 20;

/// SHA-1 content checksum identifying a file's bytes independently of its
/// name or location.
///
/// Stored as raw bytes rather than hex so that an index of several million
/// entries stays compact; formatted as lower-case hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum([u8; CHECKSUM_LEN]);

impl Checksum {
    pub const fn from_bytes(bytes: [u8; CHECKSUM_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CHECKSUM_LEN] {
        &self.0
    }

    /// Decode a hex digest without allocating. Upper- and lower-case are both
    /// accepted.
    pub fn from_hex(hex: impl AsRef<[u8]>) -> Option<Self> {
        let hex = hex.as_ref();
        if hex.len() != CHECKSUM_LEN * 2 {
            return None;
        }
        let mut bytes = [0u8; CHECKSUM_LEN];
        hex::decode_to_slice(hex, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    /// Decode a checksum stored as a raw blob.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; CHECKSUM_LEN]>::try_from(bytes).ok().map(Self)
    }
}
impl FromStr for Checksum {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s).ok_or_else(|| {
            Error::from(ErrorKind::ParseError {
                field: "checksum",
                value: s.to_string(),
            })
        })
    }
}
impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({self})")
    }
}
