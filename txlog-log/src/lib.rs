//! # txlog-log
//!
//! Transaction log primitives for txlog.
//!
//! This crate provides:
//! - The binary entry codec (Start, Command, Commit, CheckPoint)
//! - Versioned segment files with a fixed header
//! - A forward cursor that spans segment boundaries
//! - A minimal writer for appending entries and checkpoints

pub mod cursor;
pub mod entry;
pub mod error;
pub mod files;
pub mod header;
pub mod position;
pub mod segment;
pub mod writer;

pub use cursor::{CursorEnd, EntryCursor};
pub use entry::{CheckPointEntry, CommitEntry, EntryKind, LogEntry, StartEntry};
pub use error::LogError;
pub use files::LogFiles;
pub use header::LogHeader;
pub use position::LogPosition;
pub use segment::{LogVersion, Segment};
pub use writer::LogWriter;

/// Size of the segment header in bytes.
pub const LOG_HEADER_SIZE: usize = 24;

/// Maximum length of a variable-length field inside an entry (16 MiB).
pub const MAX_ENTRY_PAYLOAD: usize = 16 * 1024 * 1024;

/// Current on-disk format version written into segment headers.
pub const CURRENT_FORMAT_VERSION: u32 = 1;
