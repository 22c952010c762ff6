//! Shared utilities for command implementations
//!
//! This module contains:
//! - `load_rules` / `load_model` - Resolve the rule tables and optional model
//! - `read_json` / `write_json` - Batch file I/O
//! - `run_batch` - Run a batch on the blocking pool under a timeout

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sift_core::{CancelFlag, CentroidModel, EnsembleClassifier, RuleTables};
use tracing::{debug, warn};

/// Load rule tables: explicit path, then data-dir override, then built-in
pub fn load_rules(path: Option<&Path>) -> Result<Arc<RuleTables>> {
    let rules = RuleTables::load(path).context("Failed to load rule tables")?;
    debug!(version = %rules.version, "Rule tables ready");
    Ok(Arc::new(rules))
}

/// Load a model written by `sift train`
pub fn load_model(path: &Path) -> Result<CentroidModel> {
    let model: CentroidModel = read_json(path)
        .with_context(|| format!("Failed to load model from {}", path.display()))?;
    debug!(
        features = model.feature_names.len(),
        trained_rows = model.trained_rows,
        "Loaded model"
    );
    Ok(model)
}

/// Classifier over the given rules, with the model if one was given
pub fn build_classifier(
    rules: Arc<RuleTables>,
    model_path: Option<&Path>,
) -> Result<EnsembleClassifier> {
    let classifier = EnsembleClassifier::new(rules);
    match model_path {
        Some(path) => Ok(classifier.with_model(Arc::new(load_model(path)?))),
        None => Ok(classifier),
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Write pretty JSON to a file, or to stdout when no path is given
pub fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    match path {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
        }
        None => {
            println!("{}", json);
            Ok(())
        }
    }
}

/// Run a batch job on the blocking pool, cancelling it after `timeout_secs`
///
/// On timeout the cancel flag is raised so the worker stops at the next
/// transaction, and no partial output is returned.
pub async fn run_batch<T, F>(timeout_secs: u64, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&CancelFlag) -> sift_core::Result<T> + Send + 'static,
{
    let cancel = CancelFlag::new();
    let worker_flag = cancel.clone();
    let handle = tokio::task::spawn_blocking(move || job(&worker_flag));

    match tokio::time::timeout(Duration::from_secs(timeout_secs), handle).await {
        Ok(joined) => {
            let result = joined.context("Batch worker panicked")?;
            Ok(result?)
        }
        Err(_) => {
            cancel.cancel();
            warn!(timeout_secs, "Batch timed out, cancelling");
            bail!("Batch timed out after {}s", timeout_secs)
        }
    }
}
