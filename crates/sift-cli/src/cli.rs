//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Sift - Categorize transactions and surface spending patterns
#[derive(Parser)]
#[command(name = "sift")]
#[command(about = "Ensemble transaction classifier and spending pattern analyzer", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Rule tables file (defaults to the data-dir override, then built-in tables)
    #[arg(long, global = true)]
    pub rules: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify a batch of merchant transactions
    Classify {
        /// JSON array of merchant transactions
        #[arg(short, long)]
        input: PathBuf,

        /// Trained model file (from `sift train`)
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Write results here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Give up on the batch after this many seconds
        #[arg(long, default_value = "60")]
        timeout_secs: u64,
    },

    /// Analyze a batch of classified transactions
    Analyze {
        /// JSON array of classified transactions
        #[arg(short, long)]
        input: PathBuf,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Give up on the batch after this many seconds
        #[arg(long, default_value = "60")]
        timeout_secs: u64,
    },

    /// Classify a batch, then analyze the results
    Run {
        /// JSON array of merchant transactions
        #[arg(short, long)]
        input: PathBuf,

        /// Trained model file (from `sift train`)
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Write results here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Give up after this many seconds (one budget for classify and analyze)
        #[arg(long, default_value = "60")]
        timeout_secs: u64,
    },

    /// Train a centroid model from classified transactions
    Train {
        /// JSON array of classified transactions (the labels)
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the model
        #[arg(short, long)]
        output: PathBuf,

        /// Skip rows classified below this confidence
        #[arg(long, default_value = "0.0")]
        min_confidence: f64,
    },

    /// Show the active rule tables
    Rules,
}
