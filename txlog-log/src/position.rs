//! Positions in the version-spanning log stream.

use std::fmt;

/// An exact byte boundary in the log: `(log_version, byte_offset)`.
///
/// Positions order by version first, then by offset within the segment,
/// so comparisons work across segment boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogPosition {
    log_version: u64,
    byte_offset: u64,
}

impl LogPosition {
    pub const fn new(log_version: u64, byte_offset: u64) -> Self {
        Self {
            log_version,
            byte_offset,
        }
    }

    /// Position of the first entry in a segment, right after its header.
    pub const fn start_of(log_version: u64) -> Self {
        Self::new(log_version, crate::LOG_HEADER_SIZE as u64)
    }

    pub fn log_version(&self) -> u64 {
        self.log_version
    }

    pub fn byte_offset(&self) -> u64 {
        self.byte_offset
    }

    /// Returns this position moved forward by `len` bytes within the same segment.
    pub fn advance(&self, len: usize) -> Self {
        Self::new(self.log_version, self.byte_offset + len as u64)
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}@{}", self.log_version, self.byte_offset)
    }
}

impl std::str::FromStr for LogPosition {
    type Err = String;

    /// Parses the `v{version}@{offset}` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('v')
            .ok_or_else(|| format!("expected v<version>@<offset>, got {s:?}"))?;
        let (version, offset) = rest
            .split_once('@')
            .ok_or_else(|| format!("expected v<version>@<offset>, got {s:?}"))?;
        let version = version
            .parse()
            .map_err(|e| format!("invalid log version {version:?}: {e}"))?;
        let offset = offset
            .parse()
            .map_err(|e| format!("invalid byte offset {offset:?}: {e}"))?;
        Ok(Self::new(version, offset))
    }
}
