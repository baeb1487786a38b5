//! Inspection commands.

use colored::Colorize;
use txlog_log::{CursorEnd, EntryCursor, LogEntry, LogFiles, LogPosition};
use txlog_recovery::{
    Config, FileTransactionIdStore, TailScanner, TransactionIdStore, TransactionStream,
};

type CommandResult = Result<(), Box<dyn std::error::Error>>;

fn show(position: Option<LogPosition>) -> String {
    match position {
        Some(position) => position.to_string(),
        None => "-".dimmed().to_string(),
    }
}

pub fn scan(files: &LogFiles, config: &Config) -> CommandResult {
    let tail = TailScanner::new(files).scan()?;

    println!("{}", "Log tail".bold());
    println!("  Directory:            {}", files.dir().display());
    println!("  Segments:             {:?}", files.versions()?);
    println!("  Total size:           {} bytes", files.total_size()?);
    println!("  Holds entries:        {}", tail.files_non_empty);
    match &tail.last_checkpoint {
        Some(checkpoint) => println!(
            "  Last checkpoint:      {} -> {}",
            show(tail.checkpoint_position),
            checkpoint.target
        ),
        None => println!("  Last checkpoint:      {}", "none".dimmed()),
    }
    println!("  Start position:       {}", show(tail.start_position));
    println!(
        "  First transaction:    {}",
        show(tail.first_tx_after_checkpoint)
    );
    println!("  Last transaction end: {}", show(tail.last_tx_in_log));
    println!("  End of valid data:    {}", show(tail.end_of_valid_data));
    println!("  Trailing garbage:     {} bytes", tail.garbage());

    println!();
    println!("{}", "Recovery settings".bold());
    println!(
        "  Checkpoint after:     {}",
        config.recovery.checkpoint_after_recovery
    );
    match config.retention.pruner() {
        Some(pruner) => println!(
            "  Pruning:              keep {} older segments",
            pruner.keep_segments()
        ),
        None => println!("  Pruning:              {}", "disabled".dimmed()),
    }

    let state_path = config.tx_state_path();
    if state_path.is_file() {
        let store = FileTransactionIdStore::open(&state_path)?;
        let committed = store.last_committed_transaction();
        let closed = store.last_closed_transaction();
        println!();
        println!("{}", "Transaction state".bold());
        println!(
            "  Last committed:       {} (checksum {:#x}, at {})",
            committed.id, committed.checksum, committed.commit_timestamp
        );
        println!(
            "  Last closed:          {} at {}",
            closed.id,
            closed.position()
        );
    }

    println!();
    if tail.recovery_required() {
        println!("Recovery required: {}", "yes".yellow().bold());
    } else {
        println!("Recovery required: {}", "no".green().bold());
    }

    Ok(())
}

pub fn dump(files: &LogFiles, from: Option<LogPosition>, limit: Option<usize>) -> CommandResult {
    let from = match from {
        Some(from) => from,
        None => match files.lowest_version()? {
            Some(version) => LogPosition::start_of(version),
            None => {
                println!("{}", "Log is empty".dimmed());
                return Ok(());
            }
        },
    };

    let mut cursor = EntryCursor::open(files, from)?;
    let mut count = 0;
    while limit.map_or(true, |limit| count < limit) {
        let Some((at, entry)) = cursor.next_entry()? else {
            break;
        };
        count += 1;

        let at = format!("{:>14}", at.to_string()).cyan();
        match entry {
            LogEntry::Start(start) => println!(
                "{}  {}  master={} author={} started={} last_committed={} header={}B checksum={:#x}",
                at,
                "START     ".green(),
                start.master_id,
                start.author_id,
                start.time_started,
                start.last_committed_tx_when_started,
                start.additional_header.len(),
                start.checksum()
            ),
            LogEntry::Command(payload) => {
                println!("{}  {}  {}B", at, "COMMAND   ".normal(), payload.len())
            }
            LogEntry::Commit(commit) => println!(
                "{}  {}  tx={} timestamp={}",
                at,
                "COMMIT    ".blue(),
                commit.transaction_id,
                commit.commit_timestamp
            ),
            LogEntry::CheckPoint(checkpoint) => println!(
                "{}  {}  target={}",
                at,
                "CHECKPOINT".magenta(),
                checkpoint.target
            ),
        }
    }

    match cursor.end() {
        Some(CursorEnd::Incomplete { garbage }) => println!(
            "{} {} entries, then {} undecodable bytes at {}",
            "Incomplete:".yellow(),
            count,
            garbage,
            cursor.position()
        ),
        Some(_) => println!("{} entries, log ends at {}", count, cursor.position()),
        None => println!("{} entries shown", count),
    }

    Ok(())
}

pub fn verify(files: &LogFiles) -> CommandResult {
    let tail = TailScanner::new(files).scan()?;
    let (Some(start), Some(end)) = (tail.start_position, tail.end_of_valid_data) else {
        println!("{}", "Log is empty".dimmed());
        return Ok(());
    };

    let mut stream = TransactionStream::open(files, start, Some(end))?;
    let mut transactions = 0u64;
    let mut commands = 0usize;
    let mut bytes = 0usize;
    let mut last_id = None;
    while let Some(tx) = stream.next_transaction()? {
        transactions += 1;
        commands += tx.commands.len();
        bytes += tx.commands.iter().map(|c| c.len()).sum::<usize>();
        last_id = Some(tx.transaction_id());
    }

    println!("{}", "Transactions after start position".bold());
    println!("  Range:                {} .. {}", start, end);
    println!("  Committed:            {}", transactions);
    println!("  Commands:             {} ({} bytes)", commands, bytes);
    match last_id {
        Some(id) => println!("  Last transaction id:  {}", id),
        None => println!("  Last transaction id:  {}", "-".dimmed()),
    }
    match stream.dangling_start() {
        Some(position) => println!(
            "  Unfinished:           {} {}",
            "start at".yellow(),
            position
        ),
        None => println!("  Unfinished:           {}", "none".dimmed()),
    }
    println!("  Trailing garbage:     {} bytes", tail.garbage());
    println!("{}", "OK".green().bold());

    Ok(())
}
