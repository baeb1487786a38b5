//! Storage engine seam.

use crate::transactions::CommittedTransaction;
use std::fmt;

/// Error type storage engines report through [`StorageEngine`].
pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// How a recovered transaction is handed to the storage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyMode {
    /// Newest-first pass that lets the engine rebuild "before" state
    /// forward replay cannot recompute.
    ReverseRecovery,
    /// Oldest-first redo of committed transactions.
    Recovery,
}

impl fmt::Display for ApplyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyMode::ReverseRecovery => write!(f, "reverse recovery"),
            ApplyMode::Recovery => write!(f, "recovery"),
        }
    }
}

/// The storage engine recovery replays transactions into.
///
/// Re-applying a transaction that is already durable in the store must be
/// harmless: a checkpoint may target the start of such a transaction.
pub trait StorageEngine {
    /// Applies one committed transaction.
    fn apply(&mut self, tx: &CommittedTransaction, mode: ApplyMode) -> Result<(), EngineError>;

    /// Makes everything applied so far durable.
    fn force(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}
