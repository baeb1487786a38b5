//! Startup recovery.
//!
//! Recovery proceeds in fixed steps:
//! 1. Scan the log tail and decide whether recovery is needed at all
//! 2. Replay committed transactions newest-first ([`ApplyMode::ReverseRecovery`])
//! 3. Replay them again oldest-first ([`ApplyMode::Recovery`])
//! 4. Truncate the incomplete tail
//! 5. Publish the last replayed transaction to the transaction-id store
//! 6. Force the storage engine and append a checkpoint, in a fresh segment
//!    when the boundary lies in the newest one
//! 7. Prune old segments, if a pruner is configured
//!
//! Nothing is truncated or published unless both passes succeed. A crash at
//! any point leaves a log that a later run recovers from the same start
//! position.

use crate::config::RecoveryConfig;
use crate::engine::{ApplyMode, StorageEngine};
use crate::error::RecoveryError;
use crate::monitor::{NoopMonitor, RecoveryMonitor};
use crate::pruner::LogPruner;
use crate::tail::TailScanner;
use crate::transactions::{CommittedTransaction, ReverseTransactionStream, TransactionStream};
use crate::truncate::LogTruncator;
use crate::tx_id_store::TransactionIdStore;
use txlog_log::{LogFiles, LogPosition, LogWriter};

/// Result of a successful recovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The log was shut down cleanly; nothing was replayed or modified.
    Clean,
    Recovered {
        /// Committed transactions replayed in the forward pass.
        transactions: u64,
        /// Where replay began.
        start: LogPosition,
        /// Where the log now ends, before any post-recovery checkpoint.
        truncated_at: LogPosition,
        bytes_truncated: u64,
    },
}

impl RecoveryOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, RecoveryOutcome::Clean)
    }

    /// Number of transactions replayed forward.
    pub fn transactions(&self) -> u64 {
        match self {
            RecoveryOutcome::Clean => 0,
            RecoveryOutcome::Recovered { transactions, .. } => *transactions,
        }
    }
}

/// One recovery run over a log directory.
pub struct Recovery<'a> {
    files: &'a LogFiles,
    engine: &'a mut dyn StorageEngine,
    tx_ids: &'a dyn TransactionIdStore,
    monitor: &'a dyn RecoveryMonitor,
    pruner: Option<&'a dyn LogPruner>,
    config: RecoveryConfig,
}

impl<'a> Recovery<'a> {
    pub fn new(
        files: &'a LogFiles,
        engine: &'a mut dyn StorageEngine,
        tx_ids: &'a dyn TransactionIdStore,
    ) -> Self {
        Self {
            files,
            engine,
            tx_ids,
            monitor: &NoopMonitor,
            pruner: None,
            config: RecoveryConfig::default(),
        }
    }

    pub fn with_monitor(mut self, monitor: &'a dyn RecoveryMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_pruner(mut self, pruner: &'a dyn LogPruner) -> Self {
        self.pruner = Some(pruner);
        self
    }

    pub fn with_config(mut self, config: RecoveryConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs recovery to completion.
    pub fn run(mut self) -> Result<RecoveryOutcome, RecoveryError> {
        let tail = TailScanner::new(self.files).scan()?;
        if !tail.recovery_required() {
            tracing::debug!("Log is clean, no recovery needed");
            return Ok(RecoveryOutcome::Clean);
        }
        let (Some(start), Some(end)) = (tail.start_position, tail.end_of_valid_data) else {
            return Ok(RecoveryOutcome::Clean);
        };

        self.monitor.recovery_required(start);
        tracing::info!("Recovering log from {} (valid data ends at {})", start, end);

        let mut reverse = ReverseTransactionStream::open(self.files, start, Some(end))?;
        tracing::debug!("Reverse pass over {} transactions", reverse.remaining());
        while let Some(tx) = reverse.next_transaction()? {
            self.apply(&tx, ApplyMode::ReverseRecovery)?;
        }

        let mut forward = TransactionStream::open(self.files, start, Some(end))?;
        let mut transactions = 0u64;
        let mut last = None;
        while let Some(tx) = forward.next_transaction()? {
            self.apply(&tx, ApplyMode::Recovery)?;
            transactions += 1;
            last = Some(tx);
        }

        let boundary = forward.dangling_start().unwrap_or(end);
        let bytes_truncated = LogTruncator::new(self.files).truncate(boundary)?;

        if let Some(tx) = &last {
            self.tx_ids.set_last_committed_and_closed_transaction(
                tx.transaction_id(),
                tx.checksum(),
                tx.commit.commit_timestamp,
                tx.end.log_version(),
                tx.end.byte_offset(),
            )?;
        }

        self.engine.force().map_err(RecoveryError::Force)?;

        if self.config.checkpoint_after_recovery {
            let last_committed = self.tx_ids.last_committed_transaction_id();
            let mut writer = LogWriter::open(self.files, last_committed)?;
            // The boundary segment keeps ending exactly at the boundary.
            if writer.version() == boundary.log_version() {
                writer.rotate(last_committed)?;
            }
            let at = writer.write_checkpoint(boundary)?;
            writer.sync()?;
            tracing::debug!("Wrote recovery checkpoint at {} targeting {}", at, boundary);

            if let Some(pruner) = self.pruner {
                pruner.prune(self.files, boundary)?;
            }
        } else if self.pruner.is_some() {
            tracing::debug!("Skipping pruning: no recovery checkpoint was written");
        }

        self.monitor.recovery_completed(transactions);
        tracing::info!(
            "Recovery complete: {} transactions replayed, {} bytes truncated at {}",
            transactions,
            bytes_truncated,
            boundary
        );

        Ok(RecoveryOutcome::Recovered {
            transactions,
            start,
            truncated_at: boundary,
            bytes_truncated,
        })
    }

    fn apply(&mut self, tx: &CommittedTransaction, mode: ApplyMode) -> Result<(), RecoveryError> {
        self.engine
            .apply(tx, mode)
            .map_err(|source| RecoveryError::Apply {
                position: tx.position(),
                transaction_id: tx.transaction_id(),
                mode,
                source,
            })
    }
}
