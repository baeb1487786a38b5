//! Forward cursor over log entries.
//!
//! The cursor reads one segment at a time and crosses into the next
//! version when a segment is exhausted, so callers see a single stream
//! of positioned entries.
//!
//! Only the newest segment may end in an incomplete entry. In a sealed
//! segment, trailing bytes that do not decode are corruption.

use crate::entry::LogEntry;
use crate::error::LogError;
use crate::files::LogFiles;
use crate::header::LogHeader;
use crate::position::LogPosition;
use crate::segment::LogVersion;
use crate::LOG_HEADER_SIZE;
use bytes::Bytes;

/// Why a cursor stopped returning entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorEnd {
    /// Every byte of the newest segment was decoded.
    EndOfLog,
    /// The newest segment has `garbage` trailing bytes that do not form an entry.
    Incomplete { garbage: u64 },
    /// The cursor reached its limit.
    Limit,
}

/// Forward, version-spanning cursor over decoded entries.
pub struct EntryCursor<'a> {
    files: &'a LogFiles,
    newest: LogVersion,
    /// Version whose entries are held in `segment`.
    loaded: Option<LogVersion>,
    /// All entry bytes of the loaded segment, header excluded.
    segment: Bytes,
    /// Undecoded bytes of the loaded segment.
    buf: Bytes,
    /// Position of the first byte of `buf`.
    position: LogPosition,
    limit: Option<LogPosition>,
    end: Option<CursorEnd>,
}

impl<'a> EntryCursor<'a> {
    /// Opens a cursor whose first entry is the one at `from`.
    pub fn open(files: &'a LogFiles, from: LogPosition) -> Result<Self, LogError> {
        let newest = files
            .highest_version()?
            .ok_or(LogError::MissingSegment(from.log_version()))?;

        let mut cursor = Self {
            files,
            newest,
            loaded: None,
            segment: Bytes::new(),
            buf: Bytes::new(),
            position: from,
            limit: None,
            end: None,
        };
        cursor.seek(from)?;

        Ok(cursor)
    }

    /// Repositions the cursor so the next entry returned is the one at `to`.
    ///
    /// Seeking within the loaded segment reuses its bytes.
    pub fn seek(&mut self, to: LogPosition) -> Result<(), LogError> {
        if self.loaded != Some(to.log_version()) {
            self.segment = self.load(to.log_version())?;
            self.loaded = Some(to.log_version());
        }

        let skip = to
            .byte_offset()
            .checked_sub(LOG_HEADER_SIZE as u64)
            .filter(|&skip| skip <= self.segment.len() as u64)
            .ok_or(LogError::InvalidPosition { position: to })?;
        self.buf = self.segment.slice(skip as usize..);
        self.position = to;
        self.end = None;

        Ok(())
    }

    /// Stops the cursor before any entry at or after `limit`.
    pub fn with_limit(mut self, limit: LogPosition) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Position right after the last entry returned.
    pub fn position(&self) -> LogPosition {
        self.position
    }

    /// Version of the newest segment when the cursor was opened.
    pub fn newest_version(&self) -> LogVersion {
        self.newest
    }

    /// Why the cursor stopped, once `next_entry` has returned `Ok(None)`.
    pub fn end(&self) -> Option<CursorEnd> {
        self.end
    }

    /// Returns the next entry with its position.
    ///
    /// `Ok(None)` means there is no more valid data before the limit.
    /// Undecodable bytes in the newest segment are reported as an error
    /// carrying their position, so callers can decide whether that point is
    /// a truncation boundary.
    pub fn next_entry(&mut self) -> Result<Option<(LogPosition, LogEntry)>, LogError> {
        if self.end.is_some() {
            return Ok(None);
        }

        loop {
            if self.limit.is_some_and(|limit| self.position >= limit) {
                self.end = Some(CursorEnd::Limit);
                return Ok(None);
            }

            if let Some(entry) = LogEntry::decode(&mut self.buf, self.position)? {
                let at = self.position;
                self.position = at.advance(entry.encoded_len());
                return Ok(Some((at, entry)));
            }

            if self.position.log_version() >= self.newest {
                self.end = Some(if self.buf.is_empty() {
                    CursorEnd::EndOfLog
                } else {
                    CursorEnd::Incomplete {
                        garbage: self.buf.len() as u64,
                    }
                });
                return Ok(None);
            }

            if !self.buf.is_empty() {
                return Err(LogError::Corrupted {
                    position: self.position,
                    reason: format!(
                        "{} undecodable trailing bytes in sealed segment",
                        self.buf.len()
                    ),
                });
            }

            let next = self.position.log_version() + 1;
            self.segment = self.load(next)?;
            self.loaded = Some(next);
            self.buf = self.segment.clone();
            self.position = LogPosition::start_of(next);
        }
    }

    /// Reads segment `version` and returns the bytes after its header.
    fn load(&self, version: LogVersion) -> Result<Bytes, LogError> {
        let data = self.files.open_segment(version)?.read_all()?;
        match LogHeader::decode(&data, version)? {
            Some(_) => Ok(data.slice(LOG_HEADER_SIZE..)),
            // A crash while creating the newest segment leaves a short header.
            None if version == self.newest => Ok(Bytes::new()),
            None => Err(LogError::InvalidHeader {
                version,
                reason: "incomplete header in sealed segment".to_string(),
            }),
        }
    }
}
