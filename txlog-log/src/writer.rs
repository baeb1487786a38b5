//! Minimal log writer.
//!
//! Appends entries to the newest segment. Recovery uses it to write the
//! checkpoint that closes a completed recovery; tests and benchmarks use
//! it to build logs.

use crate::entry::{CheckPointEntry, CommitEntry, LogEntry, StartEntry};
use crate::error::LogError;
use crate::files::LogFiles;
use crate::position::LogPosition;
use crate::segment::{LogVersion, Segment};
use bytes::{Bytes, BytesMut};

/// Appends entries to the newest log segment.
pub struct LogWriter {
    files: LogFiles,
    segment: Segment,
    buf: BytesMut,
}

impl LogWriter {
    /// Opens the newest segment for appending, creating version 0 if the
    /// directory holds no segments.
    ///
    /// `last_committed_tx_id` goes into any header this has to write: the
    /// header of a new version 0, or a torn header of the newest segment.
    pub fn open(files: &LogFiles, last_committed_tx_id: u64) -> Result<Self, LogError> {
        let segment = match files.highest_version()? {
            Some(version) => {
                let mut segment = files.open_segment(version)?;
                if segment.read_header()?.is_none() {
                    tracing::warn!("Rewriting incomplete header of log segment {}", version);
                    segment.rewrite_header(last_committed_tx_id)?;
                }
                segment
            }
            None => files.create_segment(0, last_committed_tx_id)?,
        };

        Ok(Self {
            files: files.clone(),
            segment,
            buf: BytesMut::new(),
        })
    }

    /// Position the next entry will be written at.
    pub fn position(&self) -> LogPosition {
        LogPosition::new(self.segment.version(), self.segment.size())
    }

    /// Returns the version of the segment being appended to.
    pub fn version(&self) -> LogVersion {
        self.segment.version()
    }

    /// Appends an entry and returns the position it was written at.
    pub fn append(&mut self, entry: &LogEntry) -> Result<LogPosition, LogError> {
        let position = self.position();
        self.buf.clear();
        entry.encode(&mut self.buf)?;
        self.segment.append(&self.buf)?;
        Ok(position)
    }

    pub fn write_start(
        &mut self,
        master_id: i32,
        author_id: i32,
        time_started: i64,
        last_committed_tx_when_started: u64,
        additional_header: &[u8],
    ) -> Result<LogPosition, LogError> {
        let position = self.position();
        self.append(&LogEntry::Start(StartEntry {
            master_id,
            author_id,
            time_started,
            last_committed_tx_when_started,
            additional_header: Bytes::copy_from_slice(additional_header),
            position,
        }))
    }

    pub fn write_command(&mut self, payload: &[u8]) -> Result<LogPosition, LogError> {
        self.append(&LogEntry::Command(Bytes::copy_from_slice(payload)))
    }

    pub fn write_commit(
        &mut self,
        transaction_id: u64,
        commit_timestamp: i64,
    ) -> Result<LogPosition, LogError> {
        self.append(&LogEntry::Commit(CommitEntry {
            transaction_id,
            commit_timestamp,
        }))
    }

    pub fn write_checkpoint(&mut self, target: LogPosition) -> Result<LogPosition, LogError> {
        self.append(&LogEntry::CheckPoint(CheckPointEntry { target }))
    }

    /// Syncs the current segment and continues in a new one.
    pub fn rotate(&mut self, last_committed_tx_id: u64) -> Result<LogVersion, LogError> {
        self.segment.sync()?;
        let next = self.segment.version() + 1;
        self.segment = self.files.create_segment(next, last_committed_tx_id)?;
        tracing::debug!("Rotated to log segment {}", next);
        Ok(next)
    }

    /// Forces appended entries to disk.
    pub fn sync(&mut self) -> Result<(), LogError> {
        self.segment.sync()
    }
}
