//! txlog - transaction log inspection
//!
//! Reports what startup recovery would find in a log directory, and dumps
//! or verifies its contents. Never modifies the log.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use txlog_log::LogPosition;
use txlog_recovery::Config;

#[derive(Parser)]
#[command(name = "txlog")]
#[command(about = "Inspect txlog write-ahead transaction logs")]
#[command(version)]
struct Cli {
    /// YAML config file (defaults to $TXLOG_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory holding the `wal` log directory
    #[arg(short, long, env = "TXLOG_DATA")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the log tail and whether recovery would run
    Scan,

    /// Print every decoded entry with its position
    Dump {
        /// Position to start at, as v<version>@<offset>
        #[arg(short, long)]
        from: Option<LogPosition>,

        /// Stop after this many entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Read every transaction recovery would replay
    Verify,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::from_file(path)?;
            config.apply_env_overrides();
            tracing::debug!("Loaded config from {}", path.display());
            config
        }
        None => Config::load()?,
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    config.validate()?;

    let log_dir = config.log_dir();
    if !log_dir.is_dir() {
        return Err(format!("log directory {} does not exist", log_dir.display()).into());
    }
    let files = txlog_log::LogFiles::open(&log_dir)?;

    match cli.command {
        Commands::Scan => commands::scan(&files, &config)?,
        Commands::Dump { from, limit } => commands::dump(&files, from, limit)?,
        Commands::Verify => commands::verify(&files)?,
    }

    Ok(())
}
