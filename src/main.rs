use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dbpeek::commands::{self, Command};
use dbpeek::{Error, OpenOptions};

/// Inspect and export SQLite database files without modifying them
#[derive(Parser, Debug)]
#[command(name = "dbpeek", version)]
#[command(about = "Read-only SQLite browser and XML table exporter", long_about = None)]
struct Args {
    /// Open a database that was not shut down cleanly (journal is ignored)
    #[arg(long)]
    recover: bool,

    /// Path to the database file
    database: PathBuf,

    #[command(subcommand)]
    command: Command,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_env("DBPEEK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    let options = OpenOptions {
        recover: args.recover,
    };

    let command = args.command;

    // no subscriber while the browser owns the terminal
    if !matches!(command, Command::Browse) {
        init_tracing();
    }

    match commands::execute(&args.database, options, command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            if matches!(e.downcast_ref::<Error>(), Some(Error::DirtyShutdown)) {
                eprintln!("hint: rerun with --recover to read the main file and ignore the journal");
            }
            ExitCode::FAILURE
        }
    }
}
