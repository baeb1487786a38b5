//! Log entry codec.
//!
//! Every entry starts with a one-byte kind tag followed by its fields,
//! big-endian, with no padding:
//!
//! ```text
//! Start      | 0x01 | master_id i32 | author_id i32 | time_started i64 |
//!            |      | last_committed_tx u64 | header_len u32 | header bytes |
//! Command    | 0x03 | payload_len u32 | payload bytes |
//! Commit     | 0x05 | transaction_id u64 | commit_timestamp i64 |
//! CheckPoint | 0x07 | target_version u64 | target_offset u64 |
//! ```
//!
//! A tail that ends in the middle of an entry is the normal signature of
//! a crash, so decoding reports it as the end of valid data rather than
//! an error. Only bytes that can never form an entry are corruption.

use crate::error::LogError;
use crate::position::LogPosition;
use crate::MAX_ENTRY_PAYLOAD;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Fixed part of a Start entry, excluding the tag.
const START_FIXED_LEN: usize = 4 + 4 + 8 + 8 + 4;
/// Length prefix of a Command entry, excluding the tag.
const COMMAND_FIXED_LEN: usize = 4;
const COMMIT_LEN: usize = 8 + 8;
const CHECKPOINT_LEN: usize = 8 + 8;

/// Kind discriminator of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryKind {
    /// Beginning of a transaction.
    Start = 1,
    /// Opaque transaction content.
    Command = 3,
    /// Successful commit of the open transaction.
    Commit = 5,
    /// Durability marker.
    CheckPoint = 7,
}

impl TryFrom<u8> for EntryKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(EntryKind::Start),
            3 => Ok(EntryKind::Command),
            5 => Ok(EntryKind::Commit),
            7 => Ok(EntryKind::CheckPoint),
            other => Err(other),
        }
    }
}

/// Marks the beginning of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartEntry {
    pub master_id: i32,
    pub author_id: i32,
    pub time_started: i64,
    pub last_committed_tx_when_started: u64,
    pub additional_header: Bytes,
    /// Position of this entry in the log. Not encoded; set by the decoder.
    pub position: LogPosition,
}

impl StartEntry {
    /// Checksum identifying this transaction's origin.
    pub fn checksum(&self) -> u64 {
        Self::compute_checksum(&self.additional_header, self.master_id, self.author_id)
    }

    /// CRC32C over `additional_header`, `master_id` and `author_id`.
    pub fn compute_checksum(additional_header: &[u8], master_id: i32, author_id: i32) -> u64 {
        let crc = crc32c::crc32c(additional_header);
        let crc = crc32c::crc32c_append(crc, &master_id.to_be_bytes());
        let crc = crc32c::crc32c_append(crc, &author_id.to_be_bytes());
        u64::from(crc)
    }
}

/// Marks the successful commit of the preceding Start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitEntry {
    pub transaction_id: u64,
    pub commit_timestamp: i64,
}

/// Position from which replay must resume after a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckPointEntry {
    pub target: LogPosition,
}

/// A decoded log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    Start(StartEntry),
    Command(Bytes),
    Commit(CommitEntry),
    CheckPoint(CheckPointEntry),
}

impl LogEntry {
    /// Returns the kind tag of this entry.
    pub fn kind(&self) -> EntryKind {
        match self {
            LogEntry::Start(_) => EntryKind::Start,
            LogEntry::Command(_) => EntryKind::Command,
            LogEntry::Commit(_) => EntryKind::Commit,
            LogEntry::CheckPoint(_) => EntryKind::CheckPoint,
        }
    }

    /// Whether this entry belongs to a transaction (anything but a checkpoint).
    pub fn is_transactional(&self) -> bool {
        !matches!(self, LogEntry::CheckPoint(_))
    }

    /// Returns the total size of this entry on disk, tag included.
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            LogEntry::Start(start) => START_FIXED_LEN + start.additional_header.len(),
            LogEntry::Command(payload) => COMMAND_FIXED_LEN + payload.len(),
            LogEntry::Commit(_) => COMMIT_LEN,
            LogEntry::CheckPoint(_) => CHECKPOINT_LEN,
        }
    }

    /// Appends the encoded entry to `buf`.
    ///
    /// Nothing is written if the entry is too large to encode.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), LogError> {
        match self {
            LogEntry::Start(start) => check_field_len(start.additional_header.len())?,
            LogEntry::Command(payload) => check_field_len(payload.len())?,
            LogEntry::Commit(_) | LogEntry::CheckPoint(_) => {}
        }

        buf.reserve(self.encoded_len());
        buf.put_u8(self.kind() as u8);

        match self {
            LogEntry::Start(start) => {
                buf.put_i32(start.master_id);
                buf.put_i32(start.author_id);
                buf.put_i64(start.time_started);
                buf.put_u64(start.last_committed_tx_when_started);
                buf.put_u32(start.additional_header.len() as u32);
                buf.put_slice(&start.additional_header);
            }
            LogEntry::Command(payload) => {
                buf.put_u32(payload.len() as u32);
                buf.put_slice(payload);
            }
            LogEntry::Commit(commit) => {
                buf.put_u64(commit.transaction_id);
                buf.put_i64(commit.commit_timestamp);
            }
            LogEntry::CheckPoint(checkpoint) => {
                buf.put_u64(checkpoint.target.log_version());
                buf.put_u64(checkpoint.target.byte_offset());
            }
        }

        Ok(())
    }

    /// Decodes one entry from the front of `buf`.
    ///
    /// `position` is where the first byte of `buf` sits in the log. On
    /// success the entry's bytes are consumed from `buf`. `Ok(None)` means
    /// there is no further valid data: the buffer is empty, starts with
    /// zero padding, or holds only part of an entry. Nothing is consumed
    /// in that case.
    pub fn decode(buf: &mut Bytes, position: LogPosition) -> Result<Option<Self>, LogError> {
        let Some(&tag) = buf.first() else {
            return Ok(None);
        };
        if tag == 0 {
            return Ok(None);
        }

        let kind = EntryKind::try_from(tag)
            .map_err(|tag| LogError::corrupted(position, format!("unknown entry kind: {tag:#04x}")))?;

        let mut cur = &buf[1..];
        let entry = match kind {
            EntryKind::Start => {
                if cur.remaining() < START_FIXED_LEN {
                    return Ok(None);
                }
                let master_id = cur.get_i32();
                let author_id = cur.get_i32();
                let time_started = cur.get_i64();
                let last_committed_tx_when_started = cur.get_u64();
                let header_len = cur.get_u32() as usize;
                if header_len > MAX_ENTRY_PAYLOAD {
                    return Err(LogError::corrupted(
                        position,
                        format!("start entry header length {header_len} exceeds {MAX_ENTRY_PAYLOAD}"),
                    ));
                }
                if cur.remaining() < header_len {
                    return Ok(None);
                }
                let from = 1 + START_FIXED_LEN;
                LogEntry::Start(StartEntry {
                    master_id,
                    author_id,
                    time_started,
                    last_committed_tx_when_started,
                    additional_header: buf.slice(from..from + header_len),
                    position,
                })
            }
            EntryKind::Command => {
                if cur.remaining() < COMMAND_FIXED_LEN {
                    return Ok(None);
                }
                let payload_len = cur.get_u32() as usize;
                if payload_len > MAX_ENTRY_PAYLOAD {
                    return Err(LogError::corrupted(
                        position,
                        format!("command payload length {payload_len} exceeds {MAX_ENTRY_PAYLOAD}"),
                    ));
                }
                if cur.remaining() < payload_len {
                    return Ok(None);
                }
                let from = 1 + COMMAND_FIXED_LEN;
                LogEntry::Command(buf.slice(from..from + payload_len))
            }
            EntryKind::Commit => {
                if cur.remaining() < COMMIT_LEN {
                    return Ok(None);
                }
                LogEntry::Commit(CommitEntry {
                    transaction_id: cur.get_u64(),
                    commit_timestamp: cur.get_i64(),
                })
            }
            EntryKind::CheckPoint => {
                if cur.remaining() < CHECKPOINT_LEN {
                    return Ok(None);
                }
                let version = cur.get_u64();
                let offset = cur.get_u64();
                LogEntry::CheckPoint(CheckPointEntry {
                    target: LogPosition::new(version, offset),
                })
            }
        };

        buf.advance(entry.encoded_len());
        Ok(Some(entry))
    }
}

fn check_field_len(len: usize) -> Result<(), LogError> {
    if len > MAX_ENTRY_PAYLOAD {
        return Err(LogError::EntryTooLarge {
            size: len,
            max: MAX_ENTRY_PAYLOAD,
        });
    }
    Ok(())
}
