//! Classification command
//!
//! Reads a JSON array of merchant transactions, classifies it, and writes the
//! classified transactions as JSON.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Result};
use sift_core::{Category, ClassifiedTransaction, EnsembleClassifier, MerchantTransaction};
use tracing::info;

use super::common::{build_classifier, load_rules, read_json, run_batch, write_json};
use super::truncate;

/// Rows below this confidence are listed in the summary
const LOW_CONFIDENCE: f64 = 0.3;

pub async fn cmd_classify(
    rules_path: Option<&Path>,
    input: &Path,
    model: Option<&Path>,
    output: Option<&Path>,
    timeout_secs: u64,
) -> Result<()> {
    let classified = classify_file(rules_path, input, model, timeout_secs).await?;
    write_json(output, &classified)?;

    if let Some(path) = output {
        print_classification_summary(&classified);
        println!();
        println!("✅ Wrote {} transactions to {}", classified.len(), path.display());
    }

    Ok(())
}

/// Load, classify and return a batch file
pub async fn classify_file(
    rules_path: Option<&Path>,
    input: &Path,
    model: Option<&Path>,
    timeout_secs: u64,
) -> Result<Vec<ClassifiedTransaction>> {
    let (batch, classifier) = load_batch(rules_path, input, model)?;
    run_batch(timeout_secs, move |cancel| {
        classifier.classify_transactions_cancellable(&batch, cancel)
    })
    .await
}

/// Read a batch file and build the classifier that will run over it
pub fn load_batch(
    rules_path: Option<&Path>,
    input: &Path,
    model: Option<&Path>,
) -> Result<(Vec<MerchantTransaction>, EnsembleClassifier)> {
    let batch: Vec<MerchantTransaction> = read_json(input)?;
    if batch.is_empty() {
        bail!("{} contains no transactions", input.display());
    }

    let rules = load_rules(rules_path)?;
    let classifier = build_classifier(rules, model)?;
    info!(
        transactions = batch.len(),
        model = classifier.has_model(),
        rules = %classifier.rules().version,
        "Classifying batch"
    );
    Ok((batch, classifier))
}

pub fn print_classification_summary(classified: &[ClassifiedTransaction]) {
    let mut counts: BTreeMap<Category, (usize, f64)> = BTreeMap::new();
    for tx in classified {
        let entry = counts.entry(tx.predicted_category).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += tx.prediction_confidence;
    }

    let mut rows: Vec<(Category, usize, f64)> = counts
        .into_iter()
        .map(|(category, (count, total))| (category, count, total / count as f64))
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1));

    println!();
    println!("📊 Classification Summary");
    println!("   ─────────────────────────────");
    println!("   {:<16} {:>6} {:>10}", "Category", "Count", "Avg conf");
    for (category, count, avg) in &rows {
        println!("   {:<16} {:>6} {:>10.2}", category.as_str(), count, avg);
    }

    let failed = classified
        .iter()
        .filter(|t| t.merchant.transaction.metadata.classification_error.is_some())
        .count();
    if failed > 0 {
        println!();
        println!("   ⚠️  {} transactions fell back to the default category", failed);
    }

    let uncertain: Vec<&ClassifiedTransaction> = classified
        .iter()
        .filter(|t| t.prediction_confidence < LOW_CONFIDENCE)
        .collect();
    if !uncertain.is_empty() {
        println!();
        println!("   🤔 Low confidence ({}):", uncertain.len());
        for tx in uncertain.iter().take(10) {
            println!(
                "      {:<12} {:<30} {:>10.2}  {}",
                truncate(tx.id(), 12),
                truncate(&tx.merchant.merchant_name, 30),
                tx.amount(),
                tx.predicted_category
            );
        }
    }
}
