//! Failures command - report fields that fail validation most often.

use clap::Args;
use console::style;

use idp_core::{AnalyticsSink, SqliteSink};

use super::load_config;

/// Arguments for the failures command.
#[derive(Args)]
pub struct FailuresArgs {
    /// Number of fields to show (default: storage.top_failures_limit)
    #[arg(short, long)]
    limit: Option<usize>,

    /// Print as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(args: FailuresArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let Some(database_path) = &config.storage.database_path else {
        anyhow::bail!("Analytics persistence is disabled (storage.database_path is not set)");
    };

    let sink = SqliteSink::open(database_path)?;
    let limit = args.limit.unwrap_or(config.storage.top_failures_limit);
    let failures = sink.top_failures(limit)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&failures)?);
        return Ok(());
    }

    if failures.is_empty() {
        println!(
            "{} No validation failures recorded in {}",
            style("ℹ").blue(),
            database_path.display()
        );
        return Ok(());
    }

    println!("{:<24} {:>8}", style("Field").bold(), style("Failures").bold());
    for failure in &failures {
        println!("{:<24} {:>8}", failure.field, failure.failure_count);
    }

    Ok(())
}
