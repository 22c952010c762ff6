//! Known-merchant snapshot for merchant rule matching
//!
//! A `KnownMerchants` snapshot is built for exactly one batch: the static
//! merchant table plus whatever the batch itself already knows (rows the
//! extractor flagged as known merchants with a usable category hint). Nothing
//! carries over between batches.
//!
//! Batch-learned names are kept apart from the table. They are only consulted
//! for rows without a hint of their own, and a name whose rows disagree on the
//! hint is not learned at all, so no row's result depends on batch order.

use std::collections::BTreeMap;

use tracing::debug;

use crate::models::{Category, MerchantTransaction};
use crate::rules::RuleTables;

/// Shortest normalized name considered for fuzzy containment matching
const MIN_FUZZY_LEN: usize = 4;

/// How a merchant was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Alias,
    Fuzzy,
    /// Learned from another row of the same batch
    Learned,
}

impl MatchKind {
    /// Confidence the merchant-rules signal reports for this kind of match
    pub fn confidence(&self) -> f64 {
        match self {
            Self::Exact => 0.95,
            Self::Alias => 0.90,
            Self::Fuzzy => 0.75,
            Self::Learned => 0.6,
        }
    }
}

/// Result of looking up a merchant
#[derive(Debug, Clone, PartialEq)]
pub struct MerchantMatch {
    pub category: Category,
    pub kind: MatchKind,
    /// Normalized name of the entry that matched
    pub matched: String,
}

/// Per-batch snapshot of merchants with a known category
#[derive(Debug, Clone, Default)]
pub struct KnownMerchants {
    names: BTreeMap<String, Category>,
    aliases: BTreeMap<String, Category>,
    learned: BTreeMap<String, Category>,
}

impl KnownMerchants {
    /// Build the snapshot for one batch
    pub fn snapshot(rules: &RuleTables, batch: &[MerchantTransaction]) -> Self {
        let mut known = Self::default();

        for (name, rule) in &rules.merchants {
            known.names.insert(normalize_merchant(name), rule.category);
            for alias in &rule.aliases {
                known.aliases.insert(normalize_merchant(alias), rule.category);
            }
        }

        // None marks a name whose rows disagree
        let mut learned: BTreeMap<String, Option<Category>> = BTreeMap::new();
        for tx in batch.iter().filter(|tx| tx.merchant_is_known) {
            let Some(category) = tx.category_hint() else {
                continue;
            };
            let name = normalize_merchant(&tx.standardized_merchant);
            if name.is_empty() || known.names.contains_key(&name) || known.aliases.contains_key(&name)
            {
                continue;
            }
            learned
                .entry(name)
                .and_modify(|seen| {
                    if *seen != Some(category) {
                        *seen = None;
                    }
                })
                .or_insert(Some(category));
        }

        let conflicting = learned.values().filter(|c| c.is_none()).count();
        if conflicting > 0 {
            debug!(conflicting, "Dropped batch merchants with disagreeing hints");
        }
        known.learned = learned
            .into_iter()
            .filter_map(|(name, category)| category.map(|c| (name, c)))
            .collect();

        known
    }

    pub fn len(&self) -> usize {
        self.names.len() + self.aliases.len() + self.learned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.aliases.is_empty() && self.learned.is_empty()
    }

    /// Exact match against names learned from the batch
    pub fn lookup_learned(&self, merchant: &str) -> Option<MerchantMatch> {
        let normalized = normalize_merchant(merchant);
        self.learned.get(&normalized).map(|category| MerchantMatch {
            category: *category,
            kind: MatchKind::Learned,
            matched: normalized,
        })
    }

    /// Look up a merchant in the static table: exact name, then alias, then
    /// fuzzy containment.
    ///
    /// Fuzzy matching picks the longest known name contained in (or
    /// containing) the merchant; equal lengths resolve to the first name in
    /// sorted order.
    pub fn lookup(&self, merchant: &str) -> Option<MerchantMatch> {
        let normalized = normalize_merchant(merchant);
        if normalized.is_empty() {
            return None;
        }

        if let Some(category) = self.names.get(&normalized) {
            return Some(MerchantMatch {
                category: *category,
                kind: MatchKind::Exact,
                matched: normalized,
            });
        }

        if let Some(category) = self.aliases.get(&normalized) {
            return Some(MerchantMatch {
                category: *category,
                kind: MatchKind::Alias,
                matched: normalized,
            });
        }

        let padded = format!(" {} ", normalized);
        let mut best: Option<(&String, Category)> = None;
        for (name, category) in self.names.iter().chain(self.aliases.iter()) {
            if name.len() < MIN_FUZZY_LEN {
                continue;
            }
            let contained = padded.contains(&format!(" {} ", name))
                || (normalized.len() >= MIN_FUZZY_LEN
                    && format!(" {} ", name).contains(&padded));
            if !contained {
                continue;
            }
            let better = match best {
                Some((current, _)) => name.len() > current.len(),
                None => true,
            };
            if better {
                best = Some((name, *category));
            }
        }

        best.map(|(name, category)| MerchantMatch {
            category,
            kind: MatchKind::Fuzzy,
            matched: name.clone(),
        })
    }
}

/// Normalize a merchant name for matching
///
/// Lowercases, turns `*` and `#` into separators, drops purely numeric tokens
/// (store numbers, reference ids) and collapses whitespace.
pub fn normalize_merchant(name: &str) -> String {
    name.to_lowercase()
        .replace(['*', '#'], " ")
        .split_whitespace()
        .filter(|word| !word.chars().all(|c| c.is_ascii_digit()))
        .collect::<Vec<_>>()
        .join(" ")
}
