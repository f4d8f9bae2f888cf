//! CLI entry point for the transfer status maintenance tool.

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use transfer_notify_core::{Database, RecordStore, StatusRecord};

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let db = Database::new(&args.db).await?;
    let store = RecordStore::new(db);

    match args.command {
        Command::Status => print_status(&store, args.json).await?,
        Command::Resumable => print_resumable(&store, args.json).await?,
        Command::Prune => {
            let removed = store.prune_terminal().await?;
            if args.json {
                println!("{}", serde_json::json!({ "removed": removed }));
            } else {
                println!("removed {removed} terminal records");
            }
        }
        Command::Reset => {
            let reset = store.reset_in_flight().await?;
            if args.json {
                println!("{}", serde_json::json!({ "reset": reset }));
            } else {
                println!("marked {reset} in-flight transfers interrupted");
            }
        }
    }

    Ok(())
}

async fn print_status(store: &RecordStore, json: bool) -> Result<()> {
    let records = store.list_all().await?;
    let schedule = store.schedule_state().await?;

    if json {
        let payload = serde_json::json!({ "records": records, "schedule": schedule });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("no status records");
    }
    for record in &records {
        print_record(record);
    }
    println!(
        "schedule: {}",
        if schedule.scheduled { "registered" } else { "idle" }
    );
    Ok(())
}

async fn print_resumable(store: &RecordStore, json: bool) -> Result<()> {
    let records = store.list_resumable().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("nothing resumable");
    }
    for record in &records {
        print_record(record);
    }
    Ok(())
}

fn print_record(record: &StatusRecord) {
    println!(
        "{:>6}  {:<12}  {:>20}  gen {:<3}  {}",
        record.notification_id,
        record.status.as_str(),
        format_bytes(record),
        record.generation,
        record.display_name
    );
}

fn format_bytes(record: &StatusRecord) -> String {
    match record.total_bytes {
        Some(total) => format!("{}/{}", record.received_bytes, total),
        None => format!("{}/?", record.received_bytes),
    }
}
