//! Transaction log error types.

use crate::position::LogPosition;
use thiserror::Error;

/// Errors that can occur while reading, writing or truncating the log.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupted log entry at {position}: {reason}")]
    Corrupted { position: LogPosition, reason: String },

    #[error("invalid header in log version {version}: {reason}")]
    InvalidHeader { version: u64, reason: String },

    #[error("entry field too large: {size} bytes (max {max})")]
    EntryTooLarge { size: usize, max: usize },

    #[error("log segment not found: version {0}")]
    MissingSegment(u64),

    #[error("position {position} is outside the log")]
    InvalidPosition { position: LogPosition },
}

impl LogError {
    /// Returns the log position the error refers to, if it has one.
    pub fn position(&self) -> Option<LogPosition> {
        match self {
            LogError::Corrupted { position, .. } | LogError::InvalidPosition { position } => {
                Some(*position)
            }
            _ => None,
        }
    }

    pub(crate) fn corrupted(position: LogPosition, reason: impl Into<String>) -> Self {
        LogError::Corrupted {
            position,
            reason: reason.into(),
        }
    }
}
