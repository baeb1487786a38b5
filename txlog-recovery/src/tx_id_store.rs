//! Transaction-id bookkeeping.
//!
//! The store remembers the last committed transaction and the log position
//! right after the last closed one. Recovery republishes both after replay.

use crate::error::TxIdStoreError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use txlog_log::{LogPosition, LOG_HEADER_SIZE};

/// Id of the implicit transaction that exists before any real one.
pub const BASE_TX_ID: u64 = 1;
pub const BASE_TX_CHECKSUM: u64 = 0;
pub const BASE_TX_COMMIT_TIMESTAMP: i64 = 0;

/// Identity of the last committed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedTransactionId {
    pub id: u64,
    pub checksum: u64,
    pub commit_timestamp: i64,
}

impl CommittedTransactionId {
    pub fn base() -> Self {
        Self {
            id: BASE_TX_ID,
            checksum: BASE_TX_CHECKSUM,
            commit_timestamp: BASE_TX_COMMIT_TIMESTAMP,
        }
    }
}

/// The last closed transaction and where its log data ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedTransaction {
    pub id: u64,
    pub log_version: u64,
    pub byte_offset: u64,
}

impl ClosedTransaction {
    pub fn base() -> Self {
        Self {
            id: BASE_TX_ID,
            log_version: 0,
            byte_offset: LOG_HEADER_SIZE as u64,
        }
    }

    /// Position immediately after the transaction's commit entry.
    pub fn position(&self) -> LogPosition {
        LogPosition::new(self.log_version, self.byte_offset)
    }
}

/// Durable last-committed/last-closed bookkeeping.
///
/// Shared with the rest of the process once recovery is done, hence `&self`
/// methods.
pub trait TransactionIdStore: Send + Sync {
    fn last_committed_transaction(&self) -> CommittedTransactionId;

    fn last_closed_transaction(&self) -> ClosedTransaction;

    fn last_committed_transaction_id(&self) -> u64 {
        self.last_committed_transaction().id
    }

    /// Records `id` as both the last committed and the last closed
    /// transaction, closed at `(log_version, byte_offset)`.
    fn set_last_committed_and_closed_transaction(
        &self,
        id: u64,
        checksum: u64,
        commit_timestamp: i64,
        log_version: u64,
        byte_offset: u64,
    ) -> Result<(), TxIdStoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct TransactionIdState {
    last_committed: CommittedTransactionId,
    last_closed: ClosedTransaction,
}

impl TransactionIdState {
    fn base() -> Self {
        Self {
            last_committed: CommittedTransactionId::base(),
            last_closed: ClosedTransaction::base(),
        }
    }

    fn set(
        &mut self,
        id: u64,
        checksum: u64,
        commit_timestamp: i64,
        log_version: u64,
        byte_offset: u64,
    ) {
        self.last_committed = CommittedTransactionId {
            id,
            checksum,
            commit_timestamp,
        };
        self.last_closed = ClosedTransaction {
            id,
            log_version,
            byte_offset,
        };
    }
}

/// Transaction-id store that lives only in memory.
#[derive(Debug)]
pub struct InMemoryTransactionIdStore {
    state: Mutex<TransactionIdState>,
}

impl InMemoryTransactionIdStore {
    pub fn new(last_committed: CommittedTransactionId, last_closed: ClosedTransaction) -> Self {
        Self {
            state: Mutex::new(TransactionIdState {
                last_committed,
                last_closed,
            }),
        }
    }
}

impl Default for InMemoryTransactionIdStore {
    fn default() -> Self {
        Self {
            state: Mutex::new(TransactionIdState::base()),
        }
    }
}

impl TransactionIdStore for InMemoryTransactionIdStore {
    fn last_committed_transaction(&self) -> CommittedTransactionId {
        self.state.lock().last_committed
    }

    fn last_closed_transaction(&self) -> ClosedTransaction {
        self.state.lock().last_closed
    }

    fn set_last_committed_and_closed_transaction(
        &self,
        id: u64,
        checksum: u64,
        commit_timestamp: i64,
        log_version: u64,
        byte_offset: u64,
    ) -> Result<(), TxIdStoreError> {
        self.state
            .lock()
            .set(id, checksum, commit_timestamp, log_version, byte_offset);
        Ok(())
    }
}

/// On-disk form of the state file.
#[derive(Serialize, Deserialize)]
struct StateFile {
    crc32c: u32,
    state: TransactionIdState,
}

/// Transaction-id store persisted as a checksummed JSON file.
///
/// Updates are written to a temporary file, synced, then renamed over the
/// previous state, so a crash leaves either the old or the new state.
pub struct FileTransactionIdStore {
    path: PathBuf,
    state: Mutex<TransactionIdState>,
}

impl FileTransactionIdStore {
    /// Opens the store at `path`. A missing file yields the base state.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TxIdStoreError> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            Self::load(&path)?
        } else {
            TransactionIdState::base()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Returns the state file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<TransactionIdState, TxIdStoreError> {
        let file = File::open(path)?;
        let stored: StateFile = serde_json::from_reader(BufReader::new(file))?;

        let actual = crc32c::crc32c(&serde_json::to_vec(&stored.state)?);
        if actual != stored.crc32c {
            return Err(TxIdStoreError::Corrupted {
                path: path.to_path_buf(),
                expected: stored.crc32c,
                actual,
            });
        }

        Ok(stored.state)
    }

    fn save(&self, state: &TransactionIdState) -> Result<(), TxIdStoreError> {
        let crc32c = crc32c::crc32c(&serde_json::to_vec(state)?);
        let data = serde_json::to_vec_pretty(&StateFile {
            crc32c,
            state: *state,
        })?;

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }
}

impl TransactionIdStore for FileTransactionIdStore {
    fn last_committed_transaction(&self) -> CommittedTransactionId {
        self.state.lock().last_committed
    }

    fn last_closed_transaction(&self) -> ClosedTransaction {
        self.state.lock().last_closed
    }

    fn set_last_committed_and_closed_transaction(
        &self,
        id: u64,
        checksum: u64,
        commit_timestamp: i64,
        log_version: u64,
        byte_offset: u64,
    ) -> Result<(), TxIdStoreError> {
        let mut state = self.state.lock();
        let mut next = *state;
        next.set(id, checksum, commit_timestamp, log_version, byte_offset);
        self.save(&next)?;
        *state = next;

        tracing::debug!(
            "Last closed transaction {} at v{}@{}",
            id,
            log_version,
            byte_offset
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryTransactionIdStore::default();
        assert_eq!(store.last_committed_transaction_id(), BASE_TX_ID);
        assert_eq!(store.last_closed_transaction(), ClosedTransaction::base());

        store
            .set_last_committed_and_closed_transaction(7, 99, 1234, 2, 512)
            .unwrap();
        assert_eq!(store.last_committed_transaction_id(), 7);
        assert_eq!(store.last_committed_transaction().checksum, 99);
        assert_eq!(store.last_committed_transaction().commit_timestamp, 1234);
        assert_eq!(
            store.last_closed_transaction().position(),
            LogPosition::new(2, 512)
        );
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("txstate.json");

        {
            let store = FileTransactionIdStore::open(&path).unwrap();
            assert_eq!(store.last_committed_transaction(), CommittedTransactionId::base());
            store
                .set_last_committed_and_closed_transaction(4, 17, 5, 0, 77)
                .unwrap();
        }

        let store = FileTransactionIdStore::open(&path).unwrap();
        assert_eq!(store.last_committed_transaction_id(), 4);
        assert_eq!(
            store.last_closed_transaction(),
            ClosedTransaction {
                id: 4,
                log_version: 0,
                byte_offset: 77
            }
        );
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_file_store_detects_tampering() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("txstate.json");
        {
            let store = FileTransactionIdStore::open(&path).unwrap();
            store
                .set_last_committed_and_closed_transaction(4, 17, 5, 0, 77)
                .unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, content.replace("77", "78")).unwrap();

        assert!(matches!(
            FileTransactionIdStore::open(&path),
            Err(TxIdStoreError::Corrupted { .. })
        ));
    }
}
