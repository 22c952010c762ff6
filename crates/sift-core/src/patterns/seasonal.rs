use std::collections::BTreeMap;

use super::types::{Season, SeasonalPattern};
use super::PatternConfig;
use crate::models::ClassifiedTransaction;

/// Expense totals per season with each season's share of all spending
pub(super) fn detect_seasonal(
    batch: &[&ClassifiedTransaction],
    config: &PatternConfig,
) -> Vec<SeasonalPattern> {
    let mut totals: BTreeMap<Season, (f64, usize)> = BTreeMap::new();
    for tx in batch {
        let amount = tx.amount();
        if amount.is_finite() && amount < 0.0 {
            let entry = totals
                .entry(Season::for_month(tx.merchant.transaction.month()))
                .or_insert((0.0, 0));
            entry.0 += -amount;
            entry.1 += 1;
        }
    }

    let grand_total: f64 = totals.values().map(|(t, _)| t).sum();
    if grand_total <= 0.0 {
        return Vec::new();
    }

    totals
        .into_iter()
        .map(|(season, (total, count))| {
            let share_pct = total / grand_total * 100.0;
            SeasonalPattern {
                season,
                total,
                share_pct,
                transaction_count: count,
                is_significant: share_pct > config.seasonal_share_threshold,
            }
        })
        .collect()
}
