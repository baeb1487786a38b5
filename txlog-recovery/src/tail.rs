//! Log tail inspection.
//!
//! The scanner finds the newest checkpoint by walking segments from the
//! newest to the oldest, then reads forward from the checkpoint's target
//! to see whether any transaction data follows it and where the valid data
//! ends.

use txlog_log::{
    CheckPointEntry, EntryCursor, LogEntry, LogError, LogFiles, LogHeader, LogPosition,
    LogVersion, LOG_HEADER_SIZE,
};

/// What the tail of the log looks like.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailState {
    /// Newest checkpoint entry found.
    pub last_checkpoint: Option<CheckPointEntry>,
    /// Where that checkpoint entry itself is written.
    pub checkpoint_position: Option<LogPosition>,
    /// Where replay would begin: the checkpoint target, or the start of the
    /// oldest segment.
    pub start_position: Option<LogPosition>,
    /// First Start entry at or after `start_position`.
    pub first_tx_after_checkpoint: Option<LogPosition>,
    /// Position right after the last transaction entry at or after
    /// `start_position`.
    pub last_tx_in_log: Option<LogPosition>,
    /// Position right after the last entry that decoded.
    pub end_of_valid_data: Option<LogPosition>,
    pub newest_version: Option<LogVersion>,
    /// On-disk length of the newest segment, header included.
    pub newest_len: u64,
    /// Whether any segment holds bytes past its header.
    pub files_non_empty: bool,
}

impl TailState {
    /// Whether the log holds transactions or bytes that recovery must deal
    /// with.
    pub fn recovery_required(&self) -> bool {
        let pending = match (&self.last_checkpoint, self.last_tx_in_log) {
            (Some(checkpoint), Some(last)) => last > checkpoint.target,
            (None, Some(_)) => true,
            (_, None) => false,
        };

        pending || self.garbage() > 0
    }

    /// Bytes at the end of the newest segment that do not form entries.
    pub fn garbage(&self) -> u64 {
        let (Some(newest), Some(end)) = (self.newest_version, self.end_of_valid_data) else {
            return 0;
        };

        let valid = if end.log_version() == newest {
            end.byte_offset()
        } else {
            LOG_HEADER_SIZE as u64
        };
        self.newest_len.saturating_sub(valid)
    }
}

/// Reads the tail of the log without modifying it.
pub struct TailScanner<'a> {
    files: &'a LogFiles,
}

impl<'a> TailScanner<'a> {
    pub fn new(files: &'a LogFiles) -> Self {
        Self { files }
    }

    pub fn scan(&self) -> Result<TailState, LogError> {
        let versions = self.files.versions()?;
        let (Some(&oldest), Some(&newest)) = (versions.first(), versions.last()) else {
            return Ok(TailState::default());
        };

        let mut state = TailState {
            newest_version: Some(newest),
            newest_len: self.files.segment_len(newest)?,
            ..TailState::default()
        };
        for &version in &versions {
            if self.files.segment_len(version)? > LOG_HEADER_SIZE as u64 {
                state.files_non_empty = true;
                break;
            }
        }

        for &version in versions.iter().rev() {
            if let Some((position, checkpoint)) = self.last_checkpoint_in(version)? {
                tracing::debug!(
                    "Found checkpoint at {} targeting {}",
                    position,
                    checkpoint.target
                );
                if checkpoint.target > position {
                    return Err(LogError::Corrupted {
                        position,
                        reason: format!(
                            "checkpoint targets {}, past its own position",
                            checkpoint.target
                        ),
                    });
                }
                state.last_checkpoint = Some(checkpoint);
                state.checkpoint_position = Some(position);
                break;
            }
        }

        let start = match &state.last_checkpoint {
            Some(checkpoint) => checkpoint.target,
            None => LogPosition::start_of(oldest),
        };
        state.start_position = Some(start);

        let mut cursor = EntryCursor::open(self.files, start)?;
        loop {
            match cursor.next_entry() {
                Ok(Some((at, entry))) => {
                    if matches!(entry, LogEntry::Start(_)) && state.first_tx_after_checkpoint.is_none()
                    {
                        state.first_tx_after_checkpoint = Some(at);
                    }
                    if entry.is_transactional() {
                        state.last_tx_in_log = Some(cursor.position());
                    }
                }
                Ok(None) => break,
                Err(e) if is_tail_damage(&e, newest) => {
                    tracing::warn!("Log tail damaged: {}", e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        state.end_of_valid_data = Some(cursor.position());

        tracing::debug!(
            "Tail scan: start={} end={} last_tx={:?} garbage={}",
            start,
            cursor.position(),
            state.last_tx_in_log,
            state.garbage()
        );

        Ok(state)
    }

    /// Returns the last checkpoint entry of segment `version` that precedes
    /// any undecodable bytes.
    fn last_checkpoint_in(
        &self,
        version: LogVersion,
    ) -> Result<Option<(LogPosition, CheckPointEntry)>, LogError> {
        let data = self.files.open_segment(version)?.read_all()?;
        if LogHeader::decode(&data, version)?.is_none() {
            return Ok(None);
        }

        let mut buf = data.slice(LOG_HEADER_SIZE..);
        let mut position = LogPosition::start_of(version);
        let mut found = None;

        // A failed decode ends this segment's search; the forward read
        // decides whether the failure is fatal.
        while let Ok(Some(entry)) = LogEntry::decode(&mut buf, position) {
            let at = position;
            position = at.advance(entry.encoded_len());
            if let LogEntry::CheckPoint(checkpoint) = entry {
                found = Some((at, checkpoint));
            }
        }

        Ok(found)
    }
}

/// Corruption inside the newest segment is a crash signature, not a fatal
/// error.
fn is_tail_damage(error: &LogError, newest: LogVersion) -> bool {
    matches!(error, LogError::Corrupted { position, .. } if position.log_version() == newest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use txlog_log::LogWriter;

    fn append_raw(files: &LogFiles, version: LogVersion, bytes: &[u8]) {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(files.segment_path(version))
            .unwrap();
        file.write_all(bytes).unwrap();
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        let files = LogFiles::open(dir.path()).unwrap();

        let state = TailScanner::new(&files).scan().unwrap();
        assert_eq!(state, TailState::default());
        assert!(!state.recovery_required());
    }

    #[test]
    fn test_header_only_log() {
        let dir = TempDir::new().unwrap();
        let files = LogFiles::open(dir.path()).unwrap();
        LogWriter::open(&files, 0).unwrap();

        let state = TailScanner::new(&files).scan().unwrap();
        assert_eq!(state.start_position, Some(LogPosition::start_of(0)));
        assert_eq!(state.end_of_valid_data, Some(LogPosition::start_of(0)));
        assert!(!state.files_non_empty);
        assert!(!state.recovery_required());
    }

    #[test]
    fn test_transactions_without_checkpoint() {
        let dir = TempDir::new().unwrap();
        let files = LogFiles::open(dir.path()).unwrap();
        let mut writer = LogWriter::open(&files, 0).unwrap();
        let start = writer.write_start(0, 1, 2, 1, b"").unwrap();
        writer.write_commit(2, 3).unwrap();
        writer.sync().unwrap();

        let state = TailScanner::new(&files).scan().unwrap();
        assert_eq!(state.last_checkpoint, None);
        assert_eq!(state.first_tx_after_checkpoint, Some(start));
        assert_eq!(state.last_tx_in_log, Some(writer.position()));
        assert!(state.files_non_empty);
        assert!(state.recovery_required());
    }

    #[test]
    fn test_checkpoint_after_last_transaction_is_clean() {
        let dir = TempDir::new().unwrap();
        let files = LogFiles::open(dir.path()).unwrap();
        let mut writer = LogWriter::open(&files, 0).unwrap();
        writer.write_start(0, 1, 2, 1, b"").unwrap();
        writer.write_commit(2, 3).unwrap();
        let after_commit = writer.position();
        let checkpoint = writer.write_checkpoint(after_commit).unwrap();
        writer.sync().unwrap();

        let state = TailScanner::new(&files).scan().unwrap();
        assert_eq!(state.checkpoint_position, Some(checkpoint));
        assert_eq!(state.start_position, Some(after_commit));
        assert_eq!(state.first_tx_after_checkpoint, None);
        assert_eq!(state.last_tx_in_log, None);
        assert_eq!(state.end_of_valid_data, Some(writer.position()));
        assert!(!state.recovery_required());
    }

    #[test]
    fn test_newest_checkpoint_wins_across_segments() {
        let dir = TempDir::new().unwrap();
        let files = LogFiles::open(dir.path()).unwrap();
        let mut writer = LogWriter::open(&files, 0).unwrap();
        writer.write_checkpoint(LogPosition::start_of(0)).unwrap();
        writer.write_start(0, 1, 2, 1, b"").unwrap();
        writer.write_commit(2, 3).unwrap();
        let target = writer.position();
        writer.write_checkpoint(target).unwrap();
        writer.rotate(2).unwrap();
        let second = writer.write_start(0, 1, 4, 2, b"").unwrap();
        writer.sync().unwrap();

        let state = TailScanner::new(&files).scan().unwrap();
        assert_eq!(state.start_position, Some(target));
        assert_eq!(state.first_tx_after_checkpoint, Some(second));
        assert_eq!(state.last_tx_in_log, Some(writer.position()));
        assert_eq!(state.newest_version, Some(1));
        assert!(state.recovery_required());
    }

    #[test]
    fn test_trailing_garbage_requires_recovery() {
        let dir = TempDir::new().unwrap();
        let files = LogFiles::open(dir.path()).unwrap();
        let mut writer = LogWriter::open(&files, 0).unwrap();
        writer.write_checkpoint(LogPosition::start_of(0)).unwrap();
        writer.sync().unwrap();
        let end = writer.position();
        append_raw(&files, 0, &[0xFF, 0x00, 0x01]);

        let state = TailScanner::new(&files).scan().unwrap();
        assert_eq!(state.last_tx_in_log, None);
        assert_eq!(state.end_of_valid_data, Some(end));
        assert_eq!(state.garbage(), 3);
        assert!(state.recovery_required());
    }

    #[test]
    fn test_sealed_corruption_is_fatal() {
        let dir = TempDir::new().unwrap();
        let files = LogFiles::open(dir.path()).unwrap();
        let mut writer = LogWriter::open(&files, 0).unwrap();
        writer.write_start(0, 1, 2, 1, b"").unwrap();
        writer.sync().unwrap();
        append_raw(&files, 0, &[0xFF]);
        let mut writer = LogWriter::open(&files, 0).unwrap();
        writer.rotate(1).unwrap();

        let err = TailScanner::new(&files).scan().unwrap_err();
        assert!(matches!(err, LogError::Corrupted { .. }));
        assert_eq!(err.position().unwrap().log_version(), 0);
    }

    #[test]
    fn test_checkpoint_into_missing_segment() {
        let dir = TempDir::new().unwrap();
        let files = LogFiles::open(dir.path()).unwrap();
        let mut writer = LogWriter::open(&files, 0).unwrap();
        writer.rotate(1).unwrap();
        writer.write_checkpoint(LogPosition::start_of(0)).unwrap();
        writer.sync().unwrap();
        files.remove_segment(0).unwrap();

        assert!(matches!(
            TailScanner::new(&files).scan(),
            Err(LogError::MissingSegment(0))
        ));
    }

    #[test]
    fn test_checkpoint_past_itself_is_corruption() {
        let dir = TempDir::new().unwrap();
        let files = LogFiles::open(dir.path()).unwrap();
        let mut writer = LogWriter::open(&files, 0).unwrap();
        writer.write_checkpoint(LogPosition::new(0, 4096)).unwrap();
        writer.sync().unwrap();

        assert!(matches!(
            TailScanner::new(&files).scan(),
            Err(LogError::Corrupted { .. })
        ));
    }
}
