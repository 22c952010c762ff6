//! Cross-module properties: classify, then analyze

use std::sync::Arc;

use crate::classifier::{CentroidModel, EnsembleClassifier};
use crate::features::FeatureEngineer;
use crate::models::{Category, MerchantTransaction};
use crate::patterns::{Frequency, InsightType, PatternAnalyzer};
use crate::rules::RuleTables;
use crate::test_utils::{described_tx, merchant_tx};

fn classifier() -> EnsembleClassifier {
    EnsembleClassifier::new(Arc::new(RuleTables::embedded().unwrap()))
}

fn quarter_of_spending() -> Vec<MerchantTransaction> {
    vec![
        merchant_tx("n1", "2024-01-01", -9.99, "Netflix"),
        merchant_tx("n2", "2024-01-31", -9.99, "Netflix"),
        merchant_tx("n3", "2024-03-01", -9.99, "Netflix"),
        described_tx("p1", "2024-01-15", 500.0, "Acme Corp", "payroll"),
        described_tx("r1", "2024-01-03", -200.0, "Oak Street Properties", "january rent"),
        described_tx("g1", "2024-01-06", -85.0, "Whole Foods", "weekly groceries"),
        described_tx("g2", "2024-02-10", -92.0, "Whole Foods #102", "groceries"),
        described_tx("d1", "2024-02-16", -38.0, "Luigis", "pizza restaurant"),
        described_tx("u1", "2024-02-20", -23.0, "Uber Trip", "ride home"),
        merchant_tx("x1", "2024-03-12", -17.0, "qqzx"),
    ]
}

#[test]
fn test_every_distribution_is_complete_and_normalized() {
    let prediction = classifier().classify(&quarter_of_spending()).unwrap();
    for dist in &prediction.probabilities {
        assert_eq!(dist.len(), Category::ALL.len());
        assert!((dist.total() - 1.0).abs() < 1e-6);
        assert!(dist.iter().all(|(_, p)| *p > 0.0));
    }
    assert!(prediction
        .confidences
        .iter()
        .all(|c| (0.0..=0.98).contains(c)));
}

#[test]
fn test_pipeline_is_deterministic() {
    let batch = quarter_of_spending();
    let c = classifier();
    let first = c.classify_transactions(&batch).unwrap();
    let second = c.classify_transactions(&batch).unwrap();
    assert_eq!(first, second);

    let analyzer = PatternAnalyzer::new();
    assert_eq!(
        analyzer.analyze(&first).unwrap(),
        analyzer.analyze(&second).unwrap()
    );
}

#[test]
fn test_netflix_becomes_monthly_recurring_insight() {
    let classified = classifier()
        .classify_transactions(&quarter_of_spending())
        .unwrap();
    let report = PatternAnalyzer::new().analyze(&classified).unwrap();

    let netflix: Vec<_> = report
        .recurring
        .iter()
        .filter(|p| p.merchant == "netflix")
        .collect();
    assert_eq!(netflix.len(), 1);
    assert_eq!(netflix[0].frequency, Frequency::Monthly);
    assert_eq!(netflix[0].confidence, 0.9);
    assert_eq!(netflix[0].category, Category::Subscriptions);

    assert!(report.insights.iter().any(|i| {
        i.insight_type == InsightType::Recurring && i.category == Some(Category::Subscriptions)
    }));
}

#[test]
fn test_summary_matches_signed_amounts() {
    let classified = classifier()
        .classify_transactions(&quarter_of_spending())
        .unwrap();
    let summary = PatternAnalyzer::new().analyze_income_expenses(&classified);

    let expenses = 9.99 * 3.0 + 200.0 + 85.0 + 92.0 + 38.0 + 23.0 + 17.0;
    assert!((summary.total_income - 500.0).abs() < 1e-9);
    assert!((summary.total_expenses - expenses).abs() < 1e-9);
    assert!((summary.net_cashflow - (500.0 - expenses)).abs() < 1e-9);
    assert_eq!(summary.transaction_count, 10);
}

#[test]
fn test_concurrent_batches_match_sequential() {
    let c = Arc::new(classifier());
    let batch = quarter_of_spending();
    let expected = c.classify(&batch).unwrap();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&c);
                let batch = &batch;
                s.spawn(move || c.classify(batch).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

#[test]
fn test_trained_model_feeds_ensemble() {
    let batch = quarter_of_spending();
    let labeled = classifier().classify_transactions(&batch).unwrap();

    let engineer = FeatureEngineer::new();
    let features = engineer.engineer(&batch).unwrap();
    let labels: Vec<Category> = labeled.iter().map(|t| t.predicted_category).collect();
    let model = CentroidModel::fit(&features, &labels).unwrap();

    let with_model = classifier().with_model(Arc::new(model));
    let prediction = with_model.classify(&batch).unwrap();

    assert_eq!(prediction.len(), batch.len());
    // A model fit on these labels agrees with them on the training rows
    assert_eq!(prediction.categories[0], Category::Subscriptions);
    assert!(prediction.errors.iter().all(|e| e.is_none()));
}
