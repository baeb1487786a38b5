//! # txlog-recovery
//!
//! Crash recovery for the txlog transaction log.
//!
//! On startup, [`Recovery::run`] decides from the tail of the log whether
//! the store was shut down cleanly. If it was not, it replays the committed
//! transactions after the last checkpoint against the storage engine (a
//! reverse pass, then a forward pass), truncates incomplete trailing data,
//! and publishes the last closed transaction to the transaction-id store.

pub mod config;
pub mod engine;
pub mod error;
pub mod monitor;
pub mod pruner;
pub mod recovery;
pub mod tail;
pub mod transactions;
pub mod truncate;
pub mod tx_id_store;

pub use config::{Config, ConfigError, RecoveryConfig, RetentionConfig};
pub use engine::{ApplyMode, EngineError, StorageEngine};
pub use error::{RecoveryError, TxIdStoreError};
pub use monitor::{NoopMonitor, RecoveryMonitor, TracingMonitor};
pub use pruner::{LogPruner, RetentionPruner};
pub use recovery::{Recovery, RecoveryOutcome};
pub use tail::{TailScanner, TailState};
pub use transactions::{CommittedTransaction, ReverseTransactionStream, TransactionStream};
pub use truncate::LogTruncator;
pub use tx_id_store::{
    ClosedTransaction, CommittedTransactionId, FileTransactionIdStore, InMemoryTransactionIdStore,
    TransactionIdStore,
};
