//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Inspect and maintain the transfer status database.
///
/// The running host keeps this database current; this tool reads and
/// repairs it from the outside, for operators and tests.
#[derive(Parser, Debug)]
#[command(name = "transfer-notify")]
#[command(author, version, about)]
pub struct Args {
    /// Path to the status database
    #[arg(short = 'd', long, default_value = "transfer-notify.db")]
    pub db: PathBuf,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Emit machine-readable JSON instead of text
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show every status record plus the resumption schedule state
    Status,
    /// Show the resumable set the scheduler would act on
    Resumable,
    /// Delete terminal records (succeeded, failed, canceled)
    Prune,
    /// Mark in-flight transfers interrupted, as a cold start would
    Reset,
}
