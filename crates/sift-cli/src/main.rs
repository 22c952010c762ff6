//! Sift CLI - Transaction classifier and pattern analyzer
//!
//! Usage:
//!   sift classify --input batch.json         Classify merchant transactions
//!   sift analyze --input classified.json     Find recurring charges, spikes, trends
//!   sift run --input batch.json              Classify, then analyze
//!   sift train --input classified.json --output model.json
//!   sift rules                               Show the active rule tables

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // Logs go to stderr so JSON results on stdout stay clean
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();

    let rules = cli.rules.as_deref();

    match cli.command {
        Commands::Classify {
            input,
            model,
            output,
            timeout_secs,
        } => {
            commands::cmd_classify(
                rules,
                &input,
                model.as_deref(),
                output.as_deref(),
                timeout_secs,
            )
            .await
        }
        Commands::Analyze {
            input,
            output,
            timeout_secs,
        } => commands::cmd_analyze(&input, output.as_deref(), timeout_secs).await,
        Commands::Run {
            input,
            model,
            output,
            timeout_secs,
        } => {
            commands::cmd_run(
                rules,
                &input,
                model.as_deref(),
                output.as_deref(),
                timeout_secs,
            )
            .await
        }
        Commands::Train {
            input,
            output,
            min_confidence,
        } => commands::cmd_train(&input, &output, min_confidence),
        Commands::Rules => commands::cmd_rules(rules),
    }
}
