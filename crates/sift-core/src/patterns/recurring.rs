use std::collections::BTreeMap;

use super::types::{Frequency, RecurringPattern};
use super::{mean_std, PatternConfig};
use crate::merchants::normalize_merchant;
use crate::models::ClassifiedTransaction;

/// Find charges that repeat at a regular interval
///
/// Transactions are grouped by merchant and exact amount (in cents). A group
/// is classified by the first matching rule: monthly, weekly, then any
/// interval whose spread is under half its mean. Anything else is dropped.
pub(super) fn detect_recurring(
    batch: &[&ClassifiedTransaction],
    config: &PatternConfig,
) -> Vec<RecurringPattern> {
    let mut groups: BTreeMap<(String, i64), Vec<&ClassifiedTransaction>> = BTreeMap::new();
    for tx in batch {
        let amount = tx.amount();
        if !amount.is_finite() {
            continue;
        }
        let merchant = normalize_merchant(tx.standardized_merchant());
        if merchant.is_empty() {
            continue;
        }
        let cents = (amount * 100.0).round() as i64;
        groups.entry((merchant, cents)).or_default().push(tx);
    }

    groups
        .into_iter()
        .filter_map(|((merchant, cents), txs)| classify_group(merchant, cents, &txs, config))
        .collect()
}

fn classify_group(
    merchant: String,
    cents: i64,
    txs: &[&ClassifiedTransaction],
    config: &PatternConfig,
) -> Option<RecurringPattern> {
    if txs.len() < config.min_recurring_occurrences.max(2) {
        return None;
    }

    let intervals: Vec<f64> = txs
        .windows(2)
        .map(|w| (w[1].date() - w[0].date()).num_days() as f64)
        .collect();
    let (mean, std) = mean_std(&intervals);
    // Same-day repeats are duplicates, not a schedule
    if mean <= 0.0 {
        return None;
    }

    let (monthly_lo, monthly_hi) = config.monthly_interval_days;
    let (weekly_lo, weekly_hi) = config.weekly_interval_days;

    let (frequency, confidence) =
        if (monthly_lo..=monthly_hi).contains(&mean) && std < config.monthly_max_std_days {
            (Frequency::Monthly, config.regular_confidence)
        } else if (weekly_lo..=weekly_hi).contains(&mean) && std < config.weekly_max_std_days {
            (Frequency::Weekly, config.regular_confidence)
        } else if std < mean / 2.0 {
            let days = (mean.round() as u32).max(1);
            (Frequency::EveryNDays(days), config.interval_confidence)
        } else {
            return None;
        };

    let first = txs.first()?;
    let last = txs.last()?;

    Some(RecurringPattern {
        merchant,
        amount: cents as f64 / 100.0,
        category: last.predicted_category,
        frequency,
        confidence,
        average_interval_days: mean,
        interval_std_days: std,
        transaction_count: txs.len(),
        first_date: first.date(),
        last_date: last.date(),
        transaction_ids: txs.iter().map(|t| t.id().to_string()).collect(),
    })
}
