//! Feature engineering for the statistical classifier signal
//!
//! Turns a batch of merchant transactions into a rectangular numeric matrix:
//! - Amount features (raw, log1p, sqrt, size flags, income/expense/transfer)
//! - Temporal features (date parts, weekend, cyclical encodings, discounts)
//! - Merchant features (frequency within the batch, recurring flag)
//! - Payment method features (one-hot over observed methods, group flags)
//! - Text features (length, token count, keyword flags, optional embeddings)
//!
//! The matrix is a pure function of the batch. Merchant frequencies and the
//! payment one-hot columns depend on the batch contents, so consumers must
//! align columns by name rather than position.

use std::collections::{BTreeSet, HashMap};
use std::f64::consts::PI;
use std::sync::Arc;

use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{MerchantTransaction, PaymentGroup, PaymentMethod};

/// Keyword flags for the lexical text features
const TEXT_KEYWORDS: &[(&str, &[&str])] = &[
    ("kw_food", &["food", "restaurant", "cafe", "pizza", "burger", "dining"]),
    ("kw_fuel", &["fuel", "gas", "petrol", "diesel"]),
    ("kw_grocery", &["grocery", "groceries", "supermarket", "market"]),
    ("kw_online", &["online", ".com", "web", "app"]),
    ("kw_subscription", &["subscription", "monthly", "membership", "premium"]),
];

/// Configuration for feature extraction
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    /// Amount magnitude above which `high_amount` is set
    pub high_amount_threshold: f64,
    /// Amount magnitude below which `low_amount` is set
    pub low_amount_threshold: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            high_amount_threshold: 500.0,
            low_amount_threshold: 10.0,
        }
    }
}

/// Optional dense text embedding backend
///
/// Implementations must return one vector of `dimensions()` values per input
/// text. Any error or shape mismatch drops the embedding columns for the batch
/// and the lexical text features are used on their own.
pub trait TextEmbedder: Send + Sync {
    fn dimensions(&self) -> usize;

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f64>>>;
}

/// Engineered features, one row per transaction
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }

    /// Values of a named column; `None` if any row is too short to hold it
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        self.rows.iter().map(|row| row.get(idx).copied()).collect()
    }

    /// Value at (row, named column)
    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        let idx = self.column_index(name)?;
        self.rows.get(row)?.get(idx).copied()
    }

    /// Check the matrix has `expected_rows` rows, each as wide as the name list
    pub fn validate(&self, expected_rows: usize) -> Result<()> {
        if self.rows.len() != expected_rows {
            return Err(Error::RowCountMismatch {
                expected: expected_rows,
                actual: self.rows.len(),
            });
        }
        if let Some(row) = self
            .rows
            .iter()
            .find(|row| row.len() != self.feature_names.len())
        {
            return Err(Error::RowCountMismatch {
                expected: self.feature_names.len(),
                actual: row.len(),
            });
        }
        Ok(())
    }
}

/// Column-wise builder, transposed into rows at the end
struct ColumnBuilder {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl ColumnBuilder {
    fn new() -> Self {
        Self {
            names: Vec::new(),
            columns: Vec::new(),
        }
    }

    fn push(&mut self, name: impl Into<String>, values: impl Iterator<Item = f64>) {
        self.names.push(name.into());
        self.columns.push(values.collect());
    }

    fn finish(self, n_rows: usize) -> FeatureMatrix {
        let rows = (0..n_rows)
            .map(|i| self.columns.iter().map(|col| col[i]).collect())
            .collect();
        FeatureMatrix {
            feature_names: self.names,
            rows,
        }
    }
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Builds feature matrices from merchant transaction batches
#[derive(Clone, Default)]
pub struct FeatureEngineer {
    config: FeatureConfig,
    embedder: Option<Arc<dyn TextEmbedder>>,
}

impl std::fmt::Debug for FeatureEngineer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureEngineer")
            .field("config", &self.config)
            .field("embedder", &self.embedder.as_ref().map(|e| e.dimensions()))
            .finish()
    }
}

impl FeatureEngineer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FeatureConfig) -> Self {
        Self {
            config,
            embedder: None,
        }
    }

    /// Attach a text embedding backend
    pub fn with_embedder(mut self, embedder: Arc<dyn TextEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Build the feature matrix for a batch
    pub fn engineer(&self, batch: &[MerchantTransaction]) -> Result<FeatureMatrix> {
        if batch.is_empty() {
            return Err(Error::EmptyBatch);
        }

        let mut cols = ColumnBuilder::new();
        self.amount_features(batch, &mut cols);
        temporal_features(batch, &mut cols);
        merchant_features(batch, &mut cols);
        payment_features(batch, &mut cols);
        text_features(batch, &mut cols);
        self.embedding_features(batch, &mut cols);

        let matrix = cols.finish(batch.len());
        matrix.validate(batch.len())?;
        Ok(matrix)
    }

    fn amount_features(&self, batch: &[MerchantTransaction], cols: &mut ColumnBuilder) {
        let high = self.config.high_amount_threshold;
        let low = self.config.low_amount_threshold;

        cols.push("amount", batch.iter().map(|t| t.amount()));
        cols.push("amount_log1p", batch.iter().map(|t| t.amount().abs().ln_1p()));
        cols.push("amount_sqrt", batch.iter().map(|t| t.amount().abs().sqrt()));
        cols.push("high_amount", batch.iter().map(|t| flag(t.amount().abs() > high)));
        cols.push("low_amount", batch.iter().map(|t| flag(t.amount().abs() < low)));
        cols.push("is_income", batch.iter().map(|t| flag(t.transaction.is_income())));
        cols.push("is_expense", batch.iter().map(|t| flag(t.transaction.is_expense())));
        cols.push("is_transfer", batch.iter().map(|t| flag(is_transfer(t))));
    }

    fn embedding_features(&self, batch: &[MerchantTransaction], cols: &mut ColumnBuilder) {
        let Some(embedder) = &self.embedder else {
            return;
        };

        let texts: Vec<&str> = batch
            .iter()
            .map(|t| t.transaction.description.as_str())
            .collect();
        let dims = embedder.dimensions();

        let vectors = match embedder.embed(&texts) {
            Ok(v) if v.len() == batch.len() && v.iter().all(|row| row.len() == dims) => v,
            Ok(v) => {
                warn!(
                    rows = v.len(),
                    expected = batch.len(),
                    "Text embedder returned a malformed matrix; using lexical features only"
                );
                return;
            }
            Err(e) => {
                warn!(error = %e, "Text embedding failed; using lexical features only");
                return;
            }
        };

        for d in 0..dims {
            cols.push(format!("emb_{}", d), vectors.iter().map(|v| v[d]));
        }
    }
}

fn is_transfer(tx: &MerchantTransaction) -> bool {
    tx.transaction.payment_method == PaymentMethod::BankTransfer
        || tx.transaction.description.to_lowercase().contains("transfer")
}

fn discount_pct(tx: &MerchantTransaction) -> f64 {
    if tx.transaction.has_discount {
        tx.transaction.discount_percentage.unwrap_or(0.0)
    } else {
        0.0
    }
}

fn temporal_features(batch: &[MerchantTransaction], cols: &mut ColumnBuilder) {
    cols.push("year", batch.iter().map(|t| t.transaction.year() as f64));
    cols.push("month", batch.iter().map(|t| t.transaction.month() as f64));
    cols.push("day", batch.iter().map(|t| t.transaction.day() as f64));
    cols.push(
        "day_of_week",
        batch
            .iter()
            .map(|t| t.transaction.weekday().num_days_from_monday() as f64),
    );
    cols.push("is_weekend", batch.iter().map(|t| flag(t.transaction.is_weekend())));

    let month_angle =
        |t: &MerchantTransaction| 2.0 * PI * (t.transaction.month() - 1) as f64 / 12.0;
    let dow_angle = |t: &MerchantTransaction| {
        2.0 * PI * t.transaction.weekday().num_days_from_monday() as f64 / 7.0
    };
    cols.push("month_sin", batch.iter().map(|t| month_angle(t).sin()));
    cols.push("month_cos", batch.iter().map(|t| month_angle(t).cos()));
    cols.push("dow_sin", batch.iter().map(|t| dow_angle(t).sin()));
    cols.push("dow_cos", batch.iter().map(|t| dow_angle(t).cos()));

    cols.push("has_discount", batch.iter().map(|t| flag(t.transaction.has_discount)));
    cols.push("discount_pct", batch.iter().map(discount_pct));
    cols.push(
        "discount_amount",
        batch
            .iter()
            .map(|t| t.amount().abs() * discount_pct(t) / 100.0),
    );
    cols.push(
        "discount_weekend",
        batch
            .iter()
            .map(|t| discount_pct(t) * flag(t.transaction.is_weekend())),
    );
}

fn merchant_features(batch: &[MerchantTransaction], cols: &mut ColumnBuilder) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tx in batch {
        *counts.entry(tx.standardized_merchant.as_str()).or_insert(0) += 1;
    }
    let count = |t: &MerchantTransaction| counts[t.standardized_merchant.as_str()] as f64;
    let n = batch.len() as f64;

    cols.push("merchant_frequency", batch.iter().map(count));
    cols.push("merchant_relative_frequency", batch.iter().map(|t| count(t) / n));
    cols.push("recurring_merchant", batch.iter().map(|t| flag(count(t) > 1.0)));
}

fn payment_features(batch: &[MerchantTransaction], cols: &mut ColumnBuilder) {
    let observed: BTreeSet<PaymentMethod> = batch
        .iter()
        .map(|t| t.transaction.payment_method)
        .collect();

    for method in observed {
        cols.push(
            format!("payment_{}", method.as_str()),
            batch
                .iter()
                .map(|t| flag(t.transaction.payment_method == method)),
        );
    }

    let group = |t: &MerchantTransaction| t.transaction.payment_method.group();
    cols.push("payment_card", batch.iter().map(|t| flag(group(t) == PaymentGroup::Card)));
    cols.push("payment_cash", batch.iter().map(|t| flag(group(t) == PaymentGroup::Cash)));
    cols.push(
        "payment_digital",
        batch.iter().map(|t| flag(group(t) == PaymentGroup::Digital)),
    );
}

fn text_features(batch: &[MerchantTransaction], cols: &mut ColumnBuilder) {
    let lowered: Vec<String> = batch
        .iter()
        .map(|t| t.transaction.description.to_lowercase())
        .collect();

    cols.push("desc_length", lowered.iter().map(|d| d.chars().count() as f64));
    cols.push(
        "desc_tokens",
        lowered.iter().map(|d| d.split_whitespace().count() as f64),
    );

    for (name, words) in TEXT_KEYWORDS {
        cols.push(
            *name,
            lowered
                .iter()
                .map(|d| flag(words.iter().any(|w| d.contains(w)))),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{described_tx, merchant_tx};

    fn batch() -> Vec<MerchantTransaction> {
        let mut cash = described_tx("t2", "2024-03-10", -4.5, "corner cafe", "coffee at cafe");
        cash.transaction.payment_method = PaymentMethod::Cash;

        let mut discounted = merchant_tx("t3", "2024-03-11", -200.0, "netflix");
        discounted.transaction.has_discount = true;
        discounted.transaction.discount_percentage = Some(10.0);

        vec![
            merchant_tx("t1", "2024-03-09", -15.99, "netflix"),
            cash,
            discounted,
            described_tx("t4", "2024-03-15", 2500.0, "acme corp", "payroll transfer"),
        ]
    }

    #[test]
    fn test_matrix_is_rectangular() {
        let matrix = FeatureEngineer::new().engineer(&batch()).unwrap();
        assert_eq!(matrix.n_rows(), 4);
        assert!(matrix.rows.iter().all(|r| r.len() == matrix.n_features()));
        matrix.validate(4).unwrap();
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let err = FeatureEngineer::new().engineer(&[]).unwrap_err();
        assert!(matches!(err, Error::EmptyBatch));
    }

    #[test]
    fn test_amount_features() {
        let matrix = FeatureEngineer::new().engineer(&batch()).unwrap();
        assert_eq!(matrix.value(0, "amount"), Some(-15.99));
        assert!((matrix.value(0, "amount_log1p").unwrap() - 16.99f64.ln()).abs() < 1e-12);
        assert_eq!(matrix.value(1, "low_amount"), Some(1.0));
        assert_eq!(matrix.value(3, "high_amount"), Some(1.0));
        assert_eq!(matrix.value(3, "is_income"), Some(1.0));
        assert_eq!(matrix.value(3, "is_transfer"), Some(1.0));
        assert_eq!(matrix.value(0, "is_expense"), Some(1.0));
    }

    #[test]
    fn test_temporal_features() {
        let matrix = FeatureEngineer::new().engineer(&batch()).unwrap();
        // 2024-03-09 is a Saturday
        assert_eq!(matrix.value(0, "day_of_week"), Some(5.0));
        assert_eq!(matrix.value(0, "is_weekend"), Some(1.0));
        assert_eq!(matrix.value(2, "is_weekend"), Some(0.0));
        let sin = matrix.value(0, "month_sin").unwrap();
        let cos = matrix.value(0, "month_cos").unwrap();
        assert!((sin * sin + cos * cos - 1.0).abs() < 1e-12);
        assert_eq!(matrix.value(2, "discount_amount"), Some(20.0));
    }

    #[test]
    fn test_merchant_frequency_features() {
        let matrix = FeatureEngineer::new().engineer(&batch()).unwrap();
        assert_eq!(matrix.value(0, "merchant_frequency"), Some(2.0));
        assert_eq!(matrix.value(0, "merchant_relative_frequency"), Some(0.5));
        assert_eq!(matrix.value(0, "recurring_merchant"), Some(1.0));
        assert_eq!(matrix.value(1, "recurring_merchant"), Some(0.0));
    }

    #[test]
    fn test_payment_one_hot_covers_observed_methods_only() {
        let matrix = FeatureEngineer::new().engineer(&batch()).unwrap();
        assert!(matrix.column_index("payment_cash").is_some());
        assert!(matrix.column_index("payment_credit_card").is_some());
        assert!(matrix.column_index("payment_check").is_none());
        assert_eq!(matrix.value(1, "payment_cash"), Some(1.0));
        assert_eq!(matrix.value(0, "payment_card"), Some(1.0));
    }

    #[test]
    fn test_text_keyword_flags() {
        let matrix = FeatureEngineer::new().engineer(&batch()).unwrap();
        assert_eq!(matrix.value(1, "kw_food"), Some(1.0));
        assert_eq!(matrix.value(1, "desc_tokens"), Some(3.0));
        assert_eq!(matrix.value(0, "kw_fuel"), Some(0.0));
    }

    struct FixedEmbedder {
        fail: bool,
    }

    impl TextEmbedder for FixedEmbedder {
        fn dimensions(&self) -> usize {
            2
        }

        fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f64>>> {
            if self.fail {
                return Err(Error::Model("embedding service unavailable".to_string()));
            }
            Ok(texts.iter().map(|t| vec![t.len() as f64, 1.0]).collect())
        }
    }

    #[test]
    fn test_embedding_columns_are_appended() {
        let engineer = FeatureEngineer::new().with_embedder(Arc::new(FixedEmbedder { fail: false }));
        let matrix = engineer.engineer(&batch()).unwrap();
        assert!(matrix.column_index("emb_0").is_some());
        assert_eq!(matrix.value(0, "emb_1"), Some(1.0));
    }

    #[test]
    fn test_embedding_failure_falls_back_to_lexical() {
        let engineer = FeatureEngineer::new().with_embedder(Arc::new(FixedEmbedder { fail: true }));
        let matrix = engineer.engineer(&batch()).unwrap();
        assert!(matrix.column_index("emb_0").is_none());
        assert!(matrix.column_index("desc_length").is_some());
    }

    #[test]
    fn test_validate_detects_mismatches() {
        let matrix = FeatureMatrix {
            feature_names: vec!["a".to_string(), "b".to_string()],
            rows: vec![vec![1.0, 2.0], vec![3.0]],
        };
        assert!(matches!(
            matrix.validate(3),
            Err(Error::RowCountMismatch { expected: 3, actual: 2 })
        ));
        assert!(matches!(
            matrix.validate(2),
            Err(Error::RowCountMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_ragged_matrix_lookups_do_not_panic() {
        let matrix = FeatureMatrix {
            feature_names: vec!["a".to_string(), "b".to_string()],
            rows: vec![vec![1.0, 2.0], vec![3.0]],
        };
        assert_eq!(matrix.column("a"), Some(vec![1.0, 3.0]));
        assert_eq!(matrix.column("b"), None);
        assert_eq!(matrix.value(0, "b"), Some(2.0));
        assert_eq!(matrix.value(1, "b"), None);
        assert_eq!(matrix.value(5, "a"), None);
    }
}
