//! Log retention.

use txlog_log::{LogError, LogFiles, LogPosition, LogVersion};

/// Deletes log segments recovery no longer needs.
pub trait LogPruner {
    /// Prunes segments wholly before `upto` and returns how many were
    /// deleted. Segments at or after `upto`'s version are never touched.
    fn prune(&self, files: &LogFiles, upto: LogPosition) -> Result<usize, LogError>;
}

/// Keeps the newest `keep_segments` segments older than the prune point
/// and deletes the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPruner {
    keep_segments: usize,
}

impl RetentionPruner {
    pub fn new(keep_segments: usize) -> Self {
        Self { keep_segments }
    }

    pub fn keep_segments(&self) -> usize {
        self.keep_segments
    }
}

impl LogPruner for RetentionPruner {
    fn prune(&self, files: &LogFiles, upto: LogPosition) -> Result<usize, LogError> {
        let older: Vec<LogVersion> = files
            .versions()?
            .into_iter()
            .filter(|&version| version < upto.log_version())
            .collect();

        let excess = older.len().saturating_sub(self.keep_segments);
        if excess == 0 {
            return Ok(0);
        }

        for &version in &older[..excess] {
            files.remove_segment(version)?;
        }

        tracing::info!(
            "Pruned {} log segments before version {}",
            excess,
            upto.log_version()
        );
        Ok(excess)
    }
}
