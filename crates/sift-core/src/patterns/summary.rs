use std::collections::BTreeMap;

use super::types::FinancialSummary;
use crate::models::{Category, ClassifiedTransaction};

/// Totals by direction and category. Zero amounts count toward neither side.
pub(super) fn analyze_income_expenses(batch: &[&ClassifiedTransaction]) -> FinancialSummary {
    let mut income_by_category: BTreeMap<Category, f64> = BTreeMap::new();
    let mut expenses_by_category: BTreeMap<Category, f64> = BTreeMap::new();

    for tx in batch {
        let amount = tx.amount();
        if !amount.is_finite() {
            continue;
        }
        if amount > 0.0 {
            *income_by_category.entry(tx.predicted_category).or_insert(0.0) += amount;
        } else if amount < 0.0 {
            *expenses_by_category.entry(tx.predicted_category).or_insert(0.0) += -amount;
        }
    }

    let total_income: f64 = income_by_category.values().sum();
    let total_expenses: f64 = expenses_by_category.values().sum();

    let expense_percentages = if total_expenses > 0.0 {
        expenses_by_category
            .iter()
            .map(|(c, v)| (*c, v / total_expenses * 100.0))
            .collect()
    } else {
        BTreeMap::new()
    };

    FinancialSummary {
        total_income,
        total_expenses,
        net_cashflow: total_income - total_expenses,
        income_by_category,
        expenses_by_category,
        expense_percentages,
        transaction_count: batch.len(),
    }
}
