use std::collections::BTreeMap;

use super::types::SpendingSpike;
use super::{mean_std, PatternConfig};
use crate::models::{Category, ClassifiedTransaction};

/// Expenses whose magnitude sits more than `spike_z_threshold` standard
/// deviations from their category mean, largest deviation first
pub(super) fn detect_spikes(
    batch: &[&ClassifiedTransaction],
    config: &PatternConfig,
) -> Vec<SpendingSpike> {
    let mut by_category: BTreeMap<Category, Vec<&ClassifiedTransaction>> = BTreeMap::new();
    for tx in batch {
        let amount = tx.amount();
        if amount.is_finite() && amount < 0.0 {
            by_category.entry(tx.predicted_category).or_default().push(tx);
        }
    }

    let mut spikes = Vec::new();
    for (category, txs) in by_category {
        if txs.len() < config.spike_min_transactions {
            continue;
        }

        let magnitudes: Vec<f64> = txs.iter().map(|t| t.amount().abs()).collect();
        let (mean, std) = mean_std(&magnitudes);
        if std <= f64::EPSILON {
            continue;
        }

        for (tx, magnitude) in txs.iter().zip(&magnitudes) {
            let z = (magnitude - mean) / std;
            if z.abs() > config.spike_z_threshold {
                spikes.push(SpendingSpike {
                    transaction_id: tx.id().to_string(),
                    category,
                    date: tx.date(),
                    amount: tx.amount(),
                    deviation: z,
                    normal_range: (mean - std, mean + std),
                });
            }
        }
    }

    spikes.sort_by(|a, b| b.deviation.abs().total_cmp(&a.deviation.abs()));
    spikes
}
