//! Pattern analysis commands
//!
//! This module contains:
//! - `cmd_analyze` - Analyze an already classified batch
//! - `cmd_run` - Classify a raw batch, then analyze it

use std::path::Path;

use anyhow::{bail, Result};
use serde::Serialize;
use sift_core::{
    CancelFlag, ClassifiedTransaction, EnsembleClassifier, MerchantTransaction, PatternAnalyzer,
    PatternReport, Severity,
};
use tracing::info;

use super::classify::{load_batch, print_classification_summary};
use super::common::{read_json, run_batch, write_json};
use super::truncate;

/// Output of `sift run`
#[derive(Serialize)]
pub struct RunOutput {
    pub transactions: Vec<ClassifiedTransaction>,
    pub report: PatternReport,
}

pub async fn cmd_analyze(input: &Path, output: Option<&Path>, timeout_secs: u64) -> Result<()> {
    let classified: Vec<ClassifiedTransaction> = read_json(input)?;
    if classified.is_empty() {
        bail!("{} contains no transactions", input.display());
    }

    let report = analyze(classified, timeout_secs).await?;
    write_json(output, &report)?;

    if let Some(path) = output {
        print_report(&report);
        println!();
        println!("✅ Wrote report to {}", path.display());
    }

    Ok(())
}

pub async fn cmd_run(
    rules_path: Option<&Path>,
    input: &Path,
    model: Option<&Path>,
    output: Option<&Path>,
    timeout_secs: u64,
) -> Result<()> {
    let (batch, classifier) = load_batch(rules_path, input, model)?;
    let analyzer = PatternAnalyzer::new();

    // One budget covers both stages
    let result = run_batch(timeout_secs, move |cancel| {
        classify_and_analyze(&classifier, &analyzer, &batch, cancel)
    })
    .await?;
    write_json(output, &result)?;

    if let Some(path) = output {
        print_classification_summary(&result.transactions);
        print_report(&result.report);
        println!();
        println!("✅ Wrote results to {}", path.display());
    }

    Ok(())
}

/// Both stages of `sift run`, sharing one cancel flag
pub fn classify_and_analyze(
    classifier: &EnsembleClassifier,
    analyzer: &PatternAnalyzer,
    batch: &[MerchantTransaction],
    cancel: &CancelFlag,
) -> sift_core::Result<RunOutput> {
    let transactions = classifier.classify_transactions_cancellable(batch, cancel)?;
    let report = analyzer.analyze_cancellable(&transactions, cancel)?;
    Ok(RunOutput {
        transactions,
        report,
    })
}

async fn analyze(classified: Vec<ClassifiedTransaction>, timeout_secs: u64) -> Result<PatternReport> {
    info!(transactions = classified.len(), "Analyzing batch");
    let analyzer = PatternAnalyzer::new();
    run_batch(timeout_secs, move |cancel| {
        analyzer.analyze_cancellable(&classified, cancel)
    })
    .await
}

pub fn print_report(report: &PatternReport) {
    let summary = &report.summary;

    println!();
    println!("💰 Cash Flow");
    println!("   ─────────────────────────────");
    println!("   Income:    {:>12.2}", summary.total_income);
    println!("   Expenses:  {:>12.2}", summary.total_expenses);
    println!("   Net:       {:>12.2}", summary.net_cashflow);

    if !summary.expense_percentages.is_empty() {
        let mut shares: Vec<_> = summary.expense_percentages.iter().collect();
        shares.sort_by(|a, b| b.1.total_cmp(a.1));
        println!();
        println!("   Top spending:");
        for (category, pct) in shares.iter().take(5) {
            println!("      {:<16} {:>5.1}%", category.as_str(), pct);
        }
    }

    println!();
    println!("🔁 Recurring charges: {}", report.recurring.len());
    for pattern in &report.recurring {
        println!(
            "      {:<24} {:>10.2}  {:<14} {:.0}%",
            truncate(&pattern.merchant, 24),
            pattern.amount,
            pattern.frequency.label(),
            pattern.confidence * 100.0
        );
    }

    println!("📈 Spending spikes: {}", report.spikes.len());

    if report.insights.is_empty() {
        println!();
        println!("✅ Nothing unusual found.");
        return;
    }

    println!();
    println!("💡 Insights");
    for insight in &report.insights {
        let marker = match insight.severity {
            Severity::High => "🔴",
            Severity::Medium => "🟡",
            Severity::Low => "🟢",
        };
        println!("   {} {}", marker, truncate(&insight.description, 90));
    }
}
