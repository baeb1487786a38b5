//! Log directory management.

use crate::error::LogError;
use crate::segment::{parse_segment_filename, segment_filename, LogVersion, Segment};
use std::path::{Path, PathBuf};

/// The set of segment files in a log directory.
#[derive(Debug, Clone)]
pub struct LogFiles {
    dir: PathBuf,
}

impl LogFiles {
    /// Uses `dir` as the log directory, creating it if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, LogError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the log directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path segment `version` has or would have.
    pub fn segment_path(&self, version: LogVersion) -> PathBuf {
        self.dir.join(segment_filename(version))
    }

    /// Lists all segment versions in the directory, sorted ascending.
    pub fn versions(&self) -> Result<Vec<LogVersion>, LogError> {
        let mut versions = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(version) = parse_segment_filename(&name) {
                versions.push(version);
            }
        }

        versions.sort_unstable();
        Ok(versions)
    }

    /// Returns the oldest segment version, or None if no segments exist.
    pub fn lowest_version(&self) -> Result<Option<LogVersion>, LogError> {
        Ok(self.versions()?.first().copied())
    }

    /// Returns the newest segment version, or None if no segments exist.
    pub fn highest_version(&self) -> Result<Option<LogVersion>, LogError> {
        Ok(self.versions()?.last().copied())
    }

    /// Returns the on-disk length of segment `version`.
    pub fn segment_len(&self, version: LogVersion) -> Result<u64, LogError> {
        match std::fs::metadata(self.segment_path(version)) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(LogError::MissingSegment(version))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn open_segment(&self, version: LogVersion) -> Result<Segment, LogError> {
        Segment::open(&self.dir, version)
    }

    pub fn create_segment(
        &self,
        version: LogVersion,
        last_committed_tx_id: u64,
    ) -> Result<Segment, LogError> {
        Segment::create(&self.dir, version, last_committed_tx_id)
    }

    /// Deletes segment `version`.
    pub fn remove_segment(&self, version: LogVersion) -> Result<(), LogError> {
        std::fs::remove_file(self.segment_path(version))?;
        tracing::info!("Removed log segment {}", version);
        Ok(())
    }

    /// Returns the total size of all segments in bytes.
    pub fn total_size(&self) -> Result<u64, LogError> {
        let mut total = 0;
        for version in self.versions()? {
            total += self.segment_len(version)?;
        }
        Ok(total)
    }
}
