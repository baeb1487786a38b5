//! Removal of trailing log data after a truncation boundary.

use txlog_log::{LogError, LogFiles, LogPosition, LOG_HEADER_SIZE};

/// Cuts the log back to a transaction boundary.
pub struct LogTruncator<'a> {
    files: &'a LogFiles,
}

impl<'a> LogTruncator<'a> {
    pub fn new(files: &'a LogFiles) -> Self {
        Self { files }
    }

    /// Shrinks the boundary's segment to exactly `boundary.byte_offset()`
    /// bytes and empties every newer segment down to its header.
    ///
    /// Returns the number of bytes removed. Truncating a log that already
    /// ends at `boundary` removes nothing.
    pub fn truncate(&self, boundary: LogPosition) -> Result<u64, LogError> {
        if boundary.byte_offset() < LOG_HEADER_SIZE as u64 {
            return Err(LogError::InvalidPosition { position: boundary });
        }

        let mut removed = 0;

        // Newest first, so a crash part way through never leaves valid
        // bytes beyond an emptied segment.
        for version in self.files.versions()?.into_iter().rev() {
            if version <= boundary.log_version() {
                break;
            }
            let mut segment = self.files.open_segment(version)?;
            let bytes = segment.truncate_at(LOG_HEADER_SIZE as u64)?;
            if bytes > 0 {
                tracing::warn!(
                    "Discarded {} bytes from log segment {} past {}",
                    bytes,
                    version,
                    boundary
                );
            }
            removed += bytes;
        }

        let mut segment = self.files.open_segment(boundary.log_version())?;
        let bytes = segment.truncate_at(boundary.byte_offset())?;
        if bytes > 0 {
            tracing::warn!("Truncated {} bytes from the log at {}", bytes, boundary);
        }
        removed += bytes;

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use txlog_log::LogWriter;

    #[test]
    fn test_truncate_within_segment() {
        let dir = TempDir::new().unwrap();
        let files = LogFiles::open(dir.path()).unwrap();
        let mut writer = LogWriter::open(&files, 0).unwrap();
        writer.write_start(0, 1, 2, 1, b"").unwrap();
        writer.write_commit(2, 3).unwrap();
        let boundary = writer.write_start(0, 1, 4, 2, b"abc").unwrap();
        writer.sync().unwrap();
        let before = files.segment_len(0).unwrap();

        let removed = LogTruncator::new(&files).truncate(boundary).unwrap();
        assert_eq!(removed, before - boundary.byte_offset());
        assert_eq!(files.segment_len(0).unwrap(), boundary.byte_offset());

        assert_eq!(LogTruncator::new(&files).truncate(boundary).unwrap(), 0);
    }

    #[test]
    fn test_truncate_resets_newer_segments() {
        let dir = TempDir::new().unwrap();
        let files = LogFiles::open(dir.path()).unwrap();
        let mut writer = LogWriter::open(&files, 0).unwrap();
        let boundary = writer.write_start(0, 1, 2, 1, b"").unwrap();
        writer.rotate(1).unwrap();
        writer.write_command(b"orphan").unwrap();
        writer.rotate(1).unwrap();
        writer.write_commit(2, 3).unwrap();
        writer.sync().unwrap();

        LogTruncator::new(&files).truncate(boundary).unwrap();

        assert_eq!(files.versions().unwrap(), vec![0, 1, 2]);
        assert_eq!(files.segment_len(0).unwrap(), boundary.byte_offset());
        assert_eq!(files.segment_len(1).unwrap(), LOG_HEADER_SIZE as u64);
        assert_eq!(files.segment_len(2).unwrap(), LOG_HEADER_SIZE as u64);
    }

    #[test]
    fn test_boundary_inside_header_is_rejected() {
        let dir = TempDir::new().unwrap();
        let files = LogFiles::open(dir.path()).unwrap();
        LogWriter::open(&files, 0).unwrap();

        assert!(matches!(
            LogTruncator::new(&files).truncate(LogPosition::new(0, 3)),
            Err(LogError::InvalidPosition { .. })
        ));
    }
}
