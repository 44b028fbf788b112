//! Snapshot line decoding.
//!
//! A location snapshot lists one physical copy per line:
//!
//! ```text
//! ["/archive/2019/lesson.mp4","da39a3ee5e6b4b0d3255bfef95601890afd80709",1048576,1551312000]
//! ```
//!
//! Snapshots run to hundreds of thousands of lines per location, so the
//! default [`LineFormat::Positional`] strategy splits the line on its fixed
//! delimiters directly instead of running it through a general-purpose
//! decoder or a regular expression (both measured an order of magnitude
//! slower at this volume).

use crate::error::{Error, ErrorKind, LineError};
use crate::models::{Checksum, PhysicalCopy};
use memchr::{memmem, memrchr};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a single snapshot line is decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineFormat {
    /// Split on the known delimiters. Fast; paths may contain commas and
    /// quotes but escape sequences are kept verbatim.
    #[default]
    Positional,
    /// Decode the line as a strict four element JSON array. Slower, but
    /// unescapes paths.
    JsonArray,
}
impl LineFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positional => "positional",
            Self::JsonArray => "json-array",
        }
    }
}
impl FromStr for LineFormat {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positional" => Ok(Self::Positional),
            "json-array" | "json" => Ok(Self::JsonArray),
            _ => exn::bail!(ErrorKind::ParseError {
                field: "format",
                value: s.to_string(),
            }),
        }
    }
}
impl fmt::Display for LineFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode one (already trimmed, non-blank) snapshot line.
pub fn parse_line(line: &str, format: LineFormat) -> Result<(Checksum, PhysicalCopy), LineError> {
    match format {
        LineFormat::Positional => parse_positional(line),
        LineFormat::JsonArray => parse_json_array(line),
    }
}

fn parse_positional(line: &str) -> Result<(Checksum, PhysicalCopy), LineError> {
    let inner = line
        .strip_prefix('[')
        .and_then(|l| l.strip_suffix(']'))
        .ok_or(LineError::Malformed("not enclosed in brackets"))?;

    // Work from the right: the two numbers never contain commas, the path might.
    let last = memrchr(b',', inner.as_bytes()).ok_or(LineError::Malformed("missing fields"))?;
    let mtime = &inner[last + 1..];
    let rest = &inner[..last];
    let second = memrchr(b',', rest.as_bytes()).ok_or(LineError::Malformed("missing fields"))?;
    let size = &rest[second + 1..];
    let quoted = &rest[..second];

    let sep = memmem::rfind(quoted.as_bytes(), b"\",\"").ok_or(LineError::Malformed("missing path separator"))?;
    let path = quoted[..sep].strip_prefix('"').ok_or(LineError::Malformed("path is not quoted"))?;
    let checksum = quoted[sep + 3..].strip_suffix('"').ok_or(LineError::Malformed("checksum is not quoted"))?;
    if path.is_empty() {
        return Err(LineError::Malformed("empty path"));
    }

    let checksum = Checksum::from_hex(checksum).ok_or_else(|| LineError::InvalidChecksum(checksum.to_string()))?;
    let size = parse_number("size", size)?;
    let mtime = parse_number("mtime", mtime)?;
    Ok((checksum, PhysicalCopy::new(path, size, mtime)))
}

fn parse_json_array(line: &str) -> Result<(Checksum, PhysicalCopy), LineError> {
    let (path, checksum, size, mtime): (String, String, i64, i64) =
        serde_json::from_str(line).map_err(|_| LineError::Malformed("not a [path, checksum, size, mtime] array"))?;
    if path.is_empty() {
        return Err(LineError::Malformed("empty path"));
    }
    let checksum = Checksum::from_hex(&checksum).ok_or(LineError::InvalidChecksum(checksum))?;
    Ok((checksum, PhysicalCopy::new(path, size, mtime)))
}

fn parse_number(field: &'static str, value: &str) -> Result<i64, LineError> {
    value.trim().parse::<i64>().map_err(|_| LineError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
