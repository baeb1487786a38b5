//! Committed transaction streams.
//!
//! A transaction is a Start entry, any number of Command entries and a
//! Commit entry. Checkpoint entries may sit between transactions and are
//! skipped. A Start that is never followed by its Commit before the data
//! ends is the incomplete tail a crash leaves behind; the stream reports
//! it through [`TransactionStream::dangling_start`] instead of failing.

use bytes::Bytes;
use txlog_log::{CommitEntry, EntryCursor, LogEntry, LogError, LogFiles, LogPosition, StartEntry};

/// A fully formed committed transaction read back from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedTransaction {
    pub start: StartEntry,
    /// Opaque content entries, in log order.
    pub commands: Vec<Bytes>,
    pub commit: CommitEntry,
    /// Position immediately after the commit entry.
    pub end: LogPosition,
}

impl CommittedTransaction {
    pub fn transaction_id(&self) -> u64 {
        self.commit.transaction_id
    }

    /// Position of the start entry.
    pub fn position(&self) -> LogPosition {
        self.start.position
    }

    pub fn checksum(&self) -> u64 {
        self.start.checksum()
    }
}

/// Forward stream of committed transactions.
pub struct TransactionStream<'a> {
    cursor: EntryCursor<'a>,
    /// End of the last complete transaction, or the opening position.
    position: LogPosition,
    dangling_start: Option<LogPosition>,
    finished: bool,
}

impl<'a> TransactionStream<'a> {
    /// Opens a stream at `from`, which must be a transaction boundary.
    ///
    /// With a `limit`, entries at or after it are treated as absent.
    pub fn open(
        files: &'a LogFiles,
        from: LogPosition,
        limit: Option<LogPosition>,
    ) -> Result<Self, LogError> {
        let mut cursor = EntryCursor::open(files, from)?;
        if let Some(limit) = limit {
            cursor = cursor.with_limit(limit);
        }

        Ok(Self {
            cursor,
            position: from,
            dangling_start: None,
            finished: false,
        })
    }

    /// Restarts the stream at another transaction boundary.
    pub fn seek(&mut self, to: LogPosition) -> Result<(), LogError> {
        self.cursor.seek(to)?;
        self.position = to;
        self.dangling_start = None;
        self.finished = false;
        Ok(())
    }

    /// End of the last complete transaction returned.
    pub fn position(&self) -> LogPosition {
        self.position
    }

    /// Position of a trailing Start with no Commit, once the stream has ended.
    pub fn dangling_start(&self) -> Option<LogPosition> {
        self.dangling_start
    }

    /// Returns the next committed transaction, or `Ok(None)` at the end of
    /// valid data.
    pub fn next_transaction(&mut self) -> Result<Option<CommittedTransaction>, LogError> {
        if self.finished {
            return Ok(None);
        }

        let mut open: Option<(StartEntry, Vec<Bytes>)> = None;

        loop {
            let Some((at, entry)) = self.cursor.next_entry()? else {
                self.finished = true;
                self.dangling_start = open.map(|(start, _)| start.position);
                return Ok(None);
            };

            match entry {
                LogEntry::Start(start) => {
                    if let Some((open_start, _)) = &open {
                        return Err(LogError::Corrupted {
                            position: at,
                            reason: format!(
                                "start entry while transaction started at {} is still open",
                                open_start.position
                            ),
                        });
                    }
                    open = Some((start, Vec::new()));
                }
                LogEntry::Command(payload) => match open.as_mut() {
                    Some((_, commands)) => commands.push(payload),
                    None => {
                        return Err(LogError::Corrupted {
                            position: at,
                            reason: "command entry outside a transaction".to_string(),
                        });
                    }
                },
                LogEntry::Commit(commit) => {
                    let Some((start, commands)) = open.take() else {
                        return Err(LogError::Corrupted {
                            position: at,
                            reason: format!(
                                "commit of transaction {} without a start entry",
                                commit.transaction_id
                            ),
                        });
                    };
                    self.position = self.cursor.position();
                    return Ok(Some(CommittedTransaction {
                        start,
                        commands,
                        commit,
                        end: self.position,
                    }));
                }
                LogEntry::CheckPoint(_) => {}
            }
        }
    }
}

/// Committed transactions from a range of the log, newest first.
///
/// The log can only be decoded forward, so opening the stream reads the
/// range once and keeps just the start position of each complete
/// transaction. Iteration then walks those positions backward and decodes
/// each transaction again on demand.
pub struct ReverseTransactionStream<'a> {
    stream: TransactionStream<'a>,
    starts: Vec<LogPosition>,
    dangling_start: Option<LogPosition>,
}

impl<'a> ReverseTransactionStream<'a> {
    pub fn open(
        files: &'a LogFiles,
        from: LogPosition,
        limit: Option<LogPosition>,
    ) -> Result<Self, LogError> {
        let mut stream = TransactionStream::open(files, from, limit)?;

        let mut starts = Vec::new();
        while let Some(tx) = stream.next_transaction()? {
            starts.push(tx.position());
        }
        let dangling_start = stream.dangling_start();

        Ok(Self {
            stream,
            starts,
            dangling_start,
        })
    }

    /// Number of transactions not yet returned.
    pub fn remaining(&self) -> usize {
        self.starts.len()
    }

    /// Trailing Start with no Commit found while buffering the range.
    pub fn dangling_start(&self) -> Option<LogPosition> {
        self.dangling_start
    }

    /// Returns the previous committed transaction, or `Ok(None)` once the
    /// start of the range is reached.
    pub fn next_transaction(&mut self) -> Result<Option<CommittedTransaction>, LogError> {
        let Some(position) = self.starts.pop() else {
            return Ok(None);
        };

        self.stream.seek(position)?;
        match self.stream.next_transaction()? {
            Some(tx) => Ok(Some(tx)),
            None => Err(LogError::Corrupted {
                position,
                reason: "transaction disappeared between reads".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::TempDir;
    use txlog_log::LogWriter;

    fn write_tx(writer: &mut LogWriter, id: u64, commands: &[&[u8]]) -> LogPosition {
        let start = writer.write_start(0, 1, id as i64, id - 1, b"").unwrap();
        for command in commands {
            writer.write_command(command).unwrap();
        }
        writer.write_commit(id, id as i64 * 10).unwrap();
        start
    }

    fn ids(stream: &mut TransactionStream<'_>) -> Vec<u64> {
        let mut ids = Vec::new();
        while let Some(tx) = stream.next_transaction().unwrap() {
            ids.push(tx.transaction_id());
        }
        ids
    }

    #[test]
    fn test_pairs_start_and_commit() {
        let dir = TempDir::new().unwrap();
        let files = LogFiles::open(dir.path()).unwrap();
        let mut writer = LogWriter::open(&files, 0).unwrap();
        let first = write_tx(&mut writer, 2, &[b"a", b"bc"]);
        writer.write_checkpoint(first).unwrap();
        write_tx(&mut writer, 3, &[]);
        writer.sync().unwrap();

        let mut stream = TransactionStream::open(&files, first, None).unwrap();
        let tx = stream.next_transaction().unwrap().unwrap();
        assert_eq!(tx.transaction_id(), 2);
        assert_eq!(tx.position(), first);
        assert_eq!(tx.commands, vec![Bytes::from_static(b"a"), Bytes::from_static(b"bc")]);
        assert_eq!(tx.commit.commit_timestamp, 20);

        let tx = stream.next_transaction().unwrap().unwrap();
        assert_eq!(tx.transaction_id(), 3);
        assert_eq!(tx.end, writer.position());

        assert!(stream.next_transaction().unwrap().is_none());
        assert_eq!(stream.dangling_start(), None);
        assert_eq!(stream.position(), writer.position());
    }

    #[test]
    fn test_dangling_start_ends_stream() {
        let dir = TempDir::new().unwrap();
        let files = LogFiles::open(dir.path()).unwrap();
        let mut writer = LogWriter::open(&files, 0).unwrap();
        write_tx(&mut writer, 2, &[]);
        let committed_end = writer.position();
        let dangling = writer.write_start(0, 1, 5, 2, b"").unwrap();
        writer.write_command(b"half").unwrap();
        writer.sync().unwrap();

        let mut stream = TransactionStream::open(&files, LogPosition::start_of(0), None).unwrap();
        assert_eq!(ids(&mut stream), vec![2]);
        assert_eq!(stream.dangling_start(), Some(dangling));
        assert_eq!(stream.position(), committed_end);

        // Repeated calls keep reporting the same end state.
        assert!(stream.next_transaction().unwrap().is_none());
        assert_eq!(stream.dangling_start(), Some(dangling));
    }

    #[test]
    fn test_commit_without_start_is_corruption() {
        let dir = TempDir::new().unwrap();
        let files = LogFiles::open(dir.path()).unwrap();
        let mut writer = LogWriter::open(&files, 0).unwrap();
        let commit = writer.write_commit(4, 5).unwrap();
        writer.sync().unwrap();

        let mut stream = TransactionStream::open(&files, LogPosition::start_of(0), None).unwrap();
        let err = stream.next_transaction().unwrap_err();
        assert!(matches!(err, LogError::Corrupted { .. }));
        assert_eq!(err.position(), Some(commit));
    }

    #[test]
    fn test_nested_start_is_corruption() {
        let dir = TempDir::new().unwrap();
        let files = LogFiles::open(dir.path()).unwrap();
        let mut writer = LogWriter::open(&files, 0).unwrap();
        writer.write_start(0, 1, 2, 3, b"").unwrap();
        let second = writer.write_start(0, 1, 2, 3, b"").unwrap();
        writer.write_commit(4, 5).unwrap();
        writer.sync().unwrap();

        let mut stream = TransactionStream::open(&files, LogPosition::start_of(0), None).unwrap();
        let err = stream.next_transaction().unwrap_err();
        assert_eq!(err.position(), Some(second));
    }

    #[test]
    fn test_limit_hides_garbage() {
        let dir = TempDir::new().unwrap();
        let files = LogFiles::open(dir.path()).unwrap();
        let mut writer = LogWriter::open(&files, 0).unwrap();
        write_tx(&mut writer, 2, &[]);
        writer.sync().unwrap();
        let limit = writer.position();
        {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(files.segment_path(0))
                .unwrap();
            file.write_all(&[0xEE, 0xEE]).unwrap();
        }

        let mut unbounded =
            TransactionStream::open(&files, LogPosition::start_of(0), None).unwrap();
        unbounded.next_transaction().unwrap();
        assert!(unbounded.next_transaction().is_err());

        let mut bounded =
            TransactionStream::open(&files, LogPosition::start_of(0), Some(limit)).unwrap();
        assert_eq!(ids(&mut bounded), vec![2]);
    }

    #[test]
    fn test_reverse_order_across_segments() {
        let dir = TempDir::new().unwrap();
        let files = LogFiles::open(dir.path()).unwrap();
        let mut writer = LogWriter::open(&files, 0).unwrap();
        write_tx(&mut writer, 2, &[b"x"]);
        write_tx(&mut writer, 3, &[]);
        writer.rotate(3).unwrap();
        write_tx(&mut writer, 4, &[b"y", b"z"]);
        let dangling = writer.write_start(0, 1, 9, 4, b"").unwrap();
        writer.sync().unwrap();

        let mut reverse =
            ReverseTransactionStream::open(&files, LogPosition::start_of(0), None).unwrap();
        assert_eq!(reverse.remaining(), 3);
        assert_eq!(reverse.dangling_start(), Some(dangling));

        let mut seen = Vec::new();
        while let Some(tx) = reverse.next_transaction().unwrap() {
            seen.push((tx.transaction_id(), tx.commands.len()));
        }
        assert_eq!(seen, vec![(4, 2), (3, 0), (2, 1)]);
        assert_eq!(reverse.remaining(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_reverse_mirrors_forward(
            txs in proptest::collection::vec((0usize..4, any::<bool>()), 1..12),
        ) {
            let dir = TempDir::new().unwrap();
            let files = LogFiles::open(dir.path()).unwrap();
            let mut writer = LogWriter::open(&files, 0).unwrap();
            for (i, (commands, rotate)) in txs.iter().enumerate() {
                let id = i as u64 + 2;
                let payloads: Vec<&[u8]> = (0..*commands).map(|_| &b"cmd"[..]).collect();
                write_tx(&mut writer, id, &payloads);
                if *rotate {
                    writer.rotate(id).unwrap();
                }
            }
            writer.sync().unwrap();

            let from = LogPosition::start_of(0);
            let mut forward = TransactionStream::open(&files, from, None).unwrap();
            let mut expected = Vec::new();
            while let Some(tx) = forward.next_transaction().unwrap() {
                expected.push((tx.transaction_id(), tx.commands.len()));
            }
            let written: Vec<_> = txs
                .iter()
                .enumerate()
                .map(|(i, (commands, _))| (i as u64 + 2, *commands))
                .collect();
            prop_assert_eq!(&expected, &written);

            let mut reverse = ReverseTransactionStream::open(&files, from, None).unwrap();
            let mut seen = Vec::new();
            while let Some(tx) = reverse.next_transaction().unwrap() {
                seen.push((tx.transaction_id(), tx.commands.len()));
            }
            expected.reverse();
            prop_assert_eq!(seen, expected);
        }
    }
}
