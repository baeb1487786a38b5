//! Segment file header.
//!
//! ```text
//! +----------+----------------+-------------+----------------------+
//! | magic    | format_version | log_version | last_committed_tx_id |
//! | 4 bytes  | 4 bytes        | 8 bytes     | 8 bytes              |
//! +----------+----------------+-------------+----------------------+
//! ```

use crate::error::LogError;
use crate::{CURRENT_FORMAT_VERSION, LOG_HEADER_SIZE};
use bytes::{Buf, BufMut, BytesMut};

/// Magic bytes at the start of every segment: "TXLG"
pub const LOG_MAGIC: [u8; 4] = *b"TXLG";

/// Header written at the start of each log segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogHeader {
    pub format_version: u32,
    pub log_version: u64,
    /// Last committed transaction when the segment was created.
    pub last_committed_tx_id: u64,
}

impl LogHeader {
    pub fn new(log_version: u64, last_committed_tx_id: u64) -> Self {
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            log_version,
            last_committed_tx_id,
        }
    }

    /// Encodes the header into exactly `LOG_HEADER_SIZE` bytes.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(LOG_HEADER_SIZE);
        buf.put_slice(&LOG_MAGIC);
        buf.put_u32(self.format_version);
        buf.put_u64(self.log_version);
        buf.put_u64(self.last_committed_tx_id);
        buf
    }

    /// Decodes the header of segment `expected_version`.
    ///
    /// Returns `Ok(None)` when fewer than `LOG_HEADER_SIZE` bytes are
    /// present, which happens when a crash interrupts segment creation.
    pub fn decode(mut buf: &[u8], expected_version: u64) -> Result<Option<Self>, LogError> {
        if buf.len() < LOG_HEADER_SIZE {
            return Ok(None);
        }

        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != LOG_MAGIC {
            return Err(LogError::InvalidHeader {
                version: expected_version,
                reason: format!("invalid magic: {:?}", magic),
            });
        }

        let format_version = buf.get_u32();
        if format_version == 0 || format_version > CURRENT_FORMAT_VERSION {
            return Err(LogError::InvalidHeader {
                version: expected_version,
                reason: format!("unsupported format version: {}", format_version),
            });
        }

        let log_version = buf.get_u64();
        if log_version != expected_version {
            return Err(LogError::InvalidHeader {
                version: expected_version,
                reason: format!("header carries log version {}", log_version),
            });
        }

        Ok(Some(Self {
            format_version,
            log_version,
            last_committed_tx_id: buf.get_u64(),
        }))
    }
}
