//! Recovery error types.

use crate::engine::{ApplyMode, EngineError};
use std::path::PathBuf;
use thiserror::Error;
use txlog_log::{LogError, LogPosition};

/// Errors that abort recovery.
///
/// Every variant is fatal: the process must not start serving until the
/// cause is fixed and recovery has been rerun from scratch.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("log error: {0}")]
    Log(#[from] LogError),

    #[error("storage engine rejected transaction {transaction_id} at {position} during {mode}: {source}")]
    Apply {
        position: LogPosition,
        transaction_id: u64,
        mode: ApplyMode,
        #[source]
        source: EngineError,
    },

    #[error("storage engine failed to force applied transactions: {0}")]
    Force(#[source] EngineError),

    #[error("transaction id store error: {0}")]
    TransactionIdStore(#[from] TxIdStoreError),
}

impl RecoveryError {
    /// Returns the log position the failure refers to, if known.
    pub fn position(&self) -> Option<LogPosition> {
        match self {
            RecoveryError::Log(e) => e.position(),
            RecoveryError::Apply { position, .. } => Some(*position),
            RecoveryError::Force(_) | RecoveryError::TransactionIdStore(_) => None,
        }
    }
}

/// Errors from the durable transaction-id store.
#[derive(Debug, Error)]
pub enum TxIdStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transaction state file {path} corrupted: CRC mismatch (expected {expected:#x}, got {actual:#x})")]
    Corrupted {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },
}
