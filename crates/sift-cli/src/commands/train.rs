//! Model training command
//!
//! Fits a centroid model on classified transactions, treating each row's
//! predicted category as its label.

use std::path::Path;

use anyhow::{bail, Context, Result};
use sift_core::{Category, CentroidModel, ClassifiedTransaction, FeatureEngineer, MerchantTransaction};
use tracing::info;

use super::common::{read_json, write_json};

pub fn cmd_train(input: &Path, output: &Path, min_confidence: f64) -> Result<()> {
    let classified: Vec<ClassifiedTransaction> = read_json(input)?;
    let model = train(&classified, min_confidence)?;

    write_json(Some(output), &model)?;

    println!("🧠 Trained centroid model");
    println!("   Rows:       {}", model.trained_rows);
    println!("   Features:   {}", model.feature_names.len());
    println!("   Categories: {}", model.categories().count());
    for category in model.categories() {
        println!("      - {}", category);
    }
    println!();
    println!("✅ Wrote model to {}", output.display());

    Ok(())
}

/// Select labelled rows and fit a model on them
///
/// Rows that fell back after a classification error carry no real label
/// and are skipped, as are rows below `min_confidence`.
pub fn train(classified: &[ClassifiedTransaction], min_confidence: f64) -> Result<CentroidModel> {
    let (batch, labels): (Vec<MerchantTransaction>, Vec<Category>) = classified
        .iter()
        .filter(|t| t.prediction_confidence >= min_confidence)
        .filter(|t| t.merchant.transaction.metadata.classification_error.is_none())
        .map(|t| (t.merchant.clone(), t.predicted_category))
        .unzip();

    if batch.is_empty() {
        bail!(
            "No training rows left of {} (min confidence {:.2})",
            classified.len(),
            min_confidence
        );
    }

    info!(
        rows = batch.len(),
        skipped = classified.len() - batch.len(),
        "Training centroid model"
    );

    let features = FeatureEngineer::new()
        .engineer(&batch)
        .context("Failed to engineer features")?;
    CentroidModel::fit(&features, &labels).context("Failed to fit model")
}
