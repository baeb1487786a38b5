//! Log segment files.
//!
//! The log is split into versioned segments. Each segment starts with a
//! [`LogHeader`] and is followed by entries. A new segment is created with
//! the next version when the writer rotates.

use crate::error::LogError;
use crate::header::LogHeader;
use crate::LOG_HEADER_SIZE;
use bytes::Bytes;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Segment version (monotonically increasing).
pub type LogVersion = u64;

/// Segment file name format: NNNNNNNNNNNNNNNN.log (16 hex digits)
pub fn segment_filename(version: LogVersion) -> String {
    format!("{:016x}.log", version)
}

/// Parse segment version from filename.
pub fn parse_segment_filename(name: &str) -> Option<LogVersion> {
    let name = name.strip_suffix(".log")?;
    if name.len() != 16 {
        return None;
    }
    u64::from_str_radix(name, 16).ok()
}

/// A single log segment file.
pub struct Segment {
    version: LogVersion,
    path: PathBuf,
    file: File,
    size: u64,
    sync_pending: bool,
}

impl Segment {
    /// Creates a new segment file and writes its header.
    pub fn create(
        dir: &Path,
        version: LogVersion,
        last_committed_tx_id: u64,
    ) -> Result<Self, LogError> {
        let path = dir.join(segment_filename(version));
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let mut segment = Self {
            version,
            path,
            file,
            size: 0,
            sync_pending: false,
        };
        segment.append(&LogHeader::new(version, last_committed_tx_id).encode())?;
        segment.sync()?;

        Ok(segment)
    }

    /// Opens an existing segment file for reading and appending.
    pub fn open(dir: &Path, version: LogVersion) -> Result<Self, LogError> {
        let path = dir.join(segment_filename(version));
        let file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LogError::MissingSegment(version));
            }
            Err(e) => return Err(e.into()),
        };

        let size = file.metadata()?.len();

        Ok(Self {
            version,
            path,
            file,
            size,
            sync_pending: false,
        })
    }

    /// Returns the segment version.
    pub fn version(&self) -> LogVersion {
        self.version
    }

    /// Returns the segment file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current size of the segment, header included.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Reads and validates the header.
    ///
    /// Returns `Ok(None)` if the file is shorter than a header.
    pub fn read_header(&mut self) -> Result<Option<LogHeader>, LogError> {
        if self.size < LOG_HEADER_SIZE as u64 {
            return Ok(None);
        }
        let mut buf = [0u8; LOG_HEADER_SIZE];
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut buf)?;
        LogHeader::decode(&buf, self.version)
    }

    /// Reads the whole segment, header included.
    pub fn read_all(&mut self) -> Result<Bytes, LogError> {
        let mut buf = Vec::with_capacity(self.size as usize);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Appends raw bytes to the end of the segment and returns the offset
    /// they were written at.
    pub fn append(&mut self, data: &[u8]) -> Result<u64, LogError> {
        let offset = self.size;

        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(data)?;
        self.size += data.len() as u64;
        self.sync_pending = true;

        Ok(offset)
    }

    /// Syncs the segment to disk.
    pub fn sync(&mut self) -> Result<(), LogError> {
        if self.sync_pending {
            self.file.sync_data()?;
            self.sync_pending = false;
        }
        Ok(())
    }

    /// Shrinks the segment to exactly `offset` bytes and makes the new
    /// length durable.
    ///
    /// Truncating to a length at or beyond the current size does nothing.
    /// Returns the number of bytes removed.
    pub fn truncate_at(&mut self, offset: u64) -> Result<u64, LogError> {
        let current = self.file.metadata()?.len();
        if offset >= current {
            self.size = current;
            return Ok(0);
        }

        self.file.set_len(offset)?;
        self.file.sync_all()?;
        self.size = offset;
        self.sync_pending = false;
        self.file.seek(SeekFrom::End(0))?;

        Ok(current - offset)
    }

    /// Rewrites a header that a crash left incomplete.
    pub fn rewrite_header(&mut self, last_committed_tx_id: u64) -> Result<(), LogError> {
        self.file.set_len(0)?;
        self.size = 0;
        self.append(&LogHeader::new(self.version, last_committed_tx_id).encode())?;
        self.file.sync_all()?;
        self.sync_pending = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_segment_filename() {
        assert_eq!(segment_filename(0), "0000000000000000.log");
        assert_eq!(segment_filename(255), "00000000000000ff.log");
        assert_eq!(segment_filename(0xDEADBEEF), "00000000deadbeef.log");
    }

    #[test]
    fn test_parse_segment_filename() {
        assert_eq!(parse_segment_filename("0000000000000000.log"), Some(0));
        assert_eq!(parse_segment_filename("00000000000000ff.log"), Some(255));
        assert_eq!(parse_segment_filename("invalid.log"), None);
        assert_eq!(parse_segment_filename("0000000000000000.wal"), None);
    }

    #[test]
    fn test_create_writes_header() {
        let dir = TempDir::new().unwrap();
        let mut segment = Segment::create(dir.path(), 3, 9).unwrap();
        assert_eq!(segment.size(), LOG_HEADER_SIZE as u64);

        let header = segment.read_header().unwrap().unwrap();
        assert_eq!(header.log_version, 3);
        assert_eq!(header.last_committed_tx_id, 9);
    }

    #[test]
    fn test_open_missing_segment() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Segment::open(dir.path(), 5),
            Err(LogError::MissingSegment(5))
        ));
    }

    #[test]
    fn test_append_and_read_all() {
        let dir = TempDir::new().unwrap();
        let mut segment = Segment::create(dir.path(), 0, 0).unwrap();

        let offset = segment.append(b"hello").unwrap();
        assert_eq!(offset, LOG_HEADER_SIZE as u64);
        segment.sync().unwrap();

        let mut reopened = Segment::open(dir.path(), 0).unwrap();
        let data = reopened.read_all().unwrap();
        assert_eq!(&data[LOG_HEADER_SIZE..], b"hello");
    }

    #[test]
    fn test_truncate_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut segment = Segment::create(dir.path(), 0, 0).unwrap();
        segment.append(&[1u8; 100]).unwrap();
        segment.sync().unwrap();

        let removed = segment.truncate_at(LOG_HEADER_SIZE as u64 + 10).unwrap();
        assert_eq!(removed, 90);
        assert_eq!(
            std::fs::metadata(segment.path()).unwrap().len(),
            LOG_HEADER_SIZE as u64 + 10
        );

        assert_eq!(segment.truncate_at(LOG_HEADER_SIZE as u64 + 10).unwrap(), 0);
        assert_eq!(segment.truncate_at(10_000).unwrap(), 0);
        assert_eq!(segment.size(), LOG_HEADER_SIZE as u64 + 10);
    }

    #[test]
    fn test_rewrite_incomplete_header() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(segment_filename(2)), b"TXL").unwrap();

        let mut segment = Segment::open(dir.path(), 2).unwrap();
        assert!(segment.read_header().unwrap().is_none());

        segment.rewrite_header(11).unwrap();
        let header = segment.read_header().unwrap().unwrap();
        assert_eq!(header.log_version, 2);
        assert_eq!(header.last_committed_tx_id, 11);
    }
}
