use std::collections::BTreeMap;

use super::types::{CategoryTrend, MonthTotal, MonthlyTrend};
use crate::models::{Category, ClassifiedTransaction};

type YearMonth = (i32, u32);

fn year_month(tx: &ClassifiedTransaction) -> YearMonth {
    let t = &tx.merchant.transaction;
    (t.year(), t.month())
}

fn month_totals(totals: BTreeMap<YearMonth, f64>) -> Vec<MonthTotal> {
    totals
        .into_iter()
        .map(|((year, month), total)| MonthTotal {
            month: format!("{:04}-{:02}", year, month),
            total,
        })
        .collect()
}

/// (last - first) / first as a percentage; 0 when the first month is 0
fn trend_pct(months: &[MonthTotal]) -> f64 {
    match (months.first(), months.last()) {
        (Some(first), Some(last)) if first.total != 0.0 => {
            (last.total - first.total) / first.total * 100.0
        }
        _ => 0.0,
    }
}

fn expenses<'a>(
    batch: &'a [&'a ClassifiedTransaction],
) -> impl Iterator<Item = (&'a ClassifiedTransaction, f64)> + 'a {
    batch.iter().filter_map(|tx| {
        let amount = tx.amount();
        (amount.is_finite() && amount < 0.0).then_some((*tx, -amount))
    })
}

/// Monthly expense trend for every category seen in at least two months
pub(super) fn category_trends(batch: &[&ClassifiedTransaction]) -> Vec<CategoryTrend> {
    let mut by_category: BTreeMap<Category, BTreeMap<YearMonth, f64>> = BTreeMap::new();
    for (tx, magnitude) in expenses(batch) {
        *by_category
            .entry(tx.predicted_category)
            .or_default()
            .entry(year_month(tx))
            .or_insert(0.0) += magnitude;
    }

    by_category
        .into_iter()
        .filter(|(_, months)| months.len() >= 2)
        .map(|(category, months)| {
            let months = month_totals(months);
            CategoryTrend {
                category,
                trend_pct: trend_pct(&months),
                months,
            }
        })
        .collect()
}

/// Trend of total monthly spending, if the batch spans at least two months
pub(super) fn monthly_trend(batch: &[&ClassifiedTransaction]) -> Option<MonthlyTrend> {
    let mut totals: BTreeMap<YearMonth, f64> = BTreeMap::new();
    for (tx, magnitude) in expenses(batch) {
        *totals.entry(year_month(tx)).or_insert(0.0) += magnitude;
    }
    if totals.len() < 2 {
        return None;
    }

    let months = month_totals(totals);
    Some(MonthlyTrend {
        trend_pct: trend_pct(&months),
        months,
    })
}
