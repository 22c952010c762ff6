//! Signal providers for the ensemble classifier
//!
//! Each provider independently scores one transaction and either abstains or
//! votes for a single category with a confidence in (0, 1]. Providers never
//! see each other's votes; combining them is the ensemble's job.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::merchants::KnownMerchants;
use crate::models::{Category, MerchantTransaction};
use crate::rules::RuleTables;

/// The kinds of signal, in priority order (highest first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignalKind {
    StatisticalModel,
    MerchantRules,
    AmountHeuristics,
    TemporalPatterns,
    KeywordMatching,
}

impl SignalKind {
    /// Priority order used to break vote ties
    pub const PRIORITY: [SignalKind; 5] = [
        Self::StatisticalModel,
        Self::MerchantRules,
        Self::AmountHeuristics,
        Self::TemporalPatterns,
        Self::KeywordMatching,
    ];

    /// Position in `PRIORITY` (0 = highest priority)
    pub fn priority(&self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|k| k == self)
            .unwrap_or(Self::PRIORITY.len())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatisticalModel => "statistical_model",
            Self::MerchantRules => "merchant_rules",
            Self::AmountHeuristics => "amount_heuristics",
            Self::TemporalPatterns => "temporal_patterns",
            Self::KeywordMatching => "keyword_matching",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single provider's vote
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalVote {
    pub category: Category,
    pub confidence: f64,
}

impl SignalVote {
    pub fn new(category: Category, confidence: f64) -> Self {
        Self {
            category,
            confidence,
        }
    }
}

/// Batch-scoped inputs shared by every provider for one transaction
pub struct SignalContext<'a> {
    pub known_merchants: &'a KnownMerchants,
    /// Statistical model output for this row, when a model ran for the batch
    pub model_prediction: Option<(Category, f64)>,
}

/// One independent scoring method
pub trait SignalProvider: Send + Sync {
    fn kind(&self) -> SignalKind;

    /// Score a transaction. `Ok(None)` means the provider has no opinion.
    fn score(
        &self,
        tx: &MerchantTransaction,
        ctx: &SignalContext<'_>,
    ) -> Result<Option<SignalVote>>;
}

/// Highest score wins; equal scores go to the lexicographically smaller name
fn pick_best(candidates: impl IntoIterator<Item = (Category, f64)>) -> Option<(Category, f64)> {
    candidates
        .into_iter()
        .filter(|(_, score)| *score > 0.0)
        .max_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then_with(|| b.0.as_str().cmp(a.0.as_str()))
        })
}

/// Income categories only for money coming in, spending categories only for
/// money going out. Transfers go either way.
fn direction_allows(category: Category, tx: &MerchantTransaction) -> bool {
    if category == Category::Transfer {
        return true;
    }
    category.is_income() == tx.transaction.is_income()
}

/// Reads the statistical model's prediction for the row
#[derive(Debug, Default)]
pub struct ModelSignal;

impl SignalProvider for ModelSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::StatisticalModel
    }

    fn score(
        &self,
        _tx: &MerchantTransaction,
        ctx: &SignalContext<'_>,
    ) -> Result<Option<SignalVote>> {
        Ok(ctx
            .model_prediction
            .filter(|(_, confidence)| confidence.is_finite() && *confidence > 0.0)
            .map(|(category, confidence)| SignalVote::new(category, confidence.min(1.0))))
    }
}

/// Merchant table lookup, then the extractor's category hint, then names
/// other rows of the batch taught the snapshot
#[derive(Debug, Clone)]
pub struct MerchantRulesSignal {
    /// Confidence for a hint on a merchant the extractor recognized
    pub known_hint_confidence: f64,
    /// Confidence for a hint on an unrecognized merchant
    pub unknown_hint_confidence: f64,
}

impl Default for MerchantRulesSignal {
    fn default() -> Self {
        Self {
            known_hint_confidence: 0.7,
            unknown_hint_confidence: 0.5,
        }
    }
}

impl SignalProvider for MerchantRulesSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::MerchantRules
    }

    fn score(
        &self,
        tx: &MerchantTransaction,
        ctx: &SignalContext<'_>,
    ) -> Result<Option<SignalVote>> {
        let found = ctx
            .known_merchants
            .lookup(&tx.standardized_merchant)
            .or_else(|| ctx.known_merchants.lookup(&tx.merchant_name));

        if let Some(m) = found {
            return Ok(Some(SignalVote::new(m.category, m.kind.confidence())));
        }

        if let Some(category) = tx.category_hint() {
            let confidence = if tx.merchant_is_known {
                self.known_hint_confidence
            } else {
                self.unknown_hint_confidence
            };
            return Ok(Some(SignalVote::new(category, confidence)));
        }

        // Only rows without a hint of their own borrow from the batch
        let learned = ctx
            .known_merchants
            .lookup_learned(&tx.standardized_merchant)
            .or_else(|| ctx.known_merchants.lookup_learned(&tx.merchant_name));
        Ok(learned.map(|m| {
            SignalVote::new(
                m.category,
                m.kind.confidence().min(self.known_hint_confidence),
            )
        }))
    }
}

/// Description keywords, scaled by whether the amount is typical for the category
#[derive(Debug, Clone)]
pub struct AmountHeuristicsSignal {
    rules: Arc<RuleTables>,
}

impl AmountHeuristicsSignal {
    /// Confidence for a single keyword hit
    const BASE: f64 = 0.5;
    /// Added per extra keyword hit
    const PER_EXTRA_MATCH: f64 = 0.1;
    const MAX: f64 = 0.8;
    /// Scale applied when the amount is outside the sweet spot
    const OUT_OF_RANGE: f64 = 0.6;

    pub fn new(rules: Arc<RuleTables>) -> Self {
        Self { rules }
    }
}

impl SignalProvider for AmountHeuristicsSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::AmountHeuristics
    }

    fn score(
        &self,
        tx: &MerchantTransaction,
        _ctx: &SignalContext<'_>,
    ) -> Result<Option<SignalVote>> {
        let description = &tx.transaction.description;
        let amount = tx.amount();

        let candidates = self.rules.amount_ranges.iter().filter_map(|(category, range)| {
            if !direction_allows(*category, tx) {
                return None;
            }
            let matches = range.matches(description);
            if matches == 0 {
                return None;
            }
            let presence =
                (Self::BASE + Self::PER_EXTRA_MATCH * (matches - 1) as f64).min(Self::MAX);
            let fit = if range.contains(amount) {
                1.0
            } else {
                Self::OUT_OF_RANGE
            };
            Some((*category, presence * fit))
        });

        Ok(pick_best(candidates).map(|(c, s)| SignalVote::new(c, s)))
    }
}

/// Seasonal and day-of-week category affinity
#[derive(Debug, Clone)]
pub struct TemporalSignal {
    rules: Arc<RuleTables>,
    /// Combined affinity below which the signal abstains
    pub min_affinity: f64,
}

impl TemporalSignal {
    pub fn new(rules: Arc<RuleTables>) -> Self {
        Self {
            rules,
            min_affinity: 0.1,
        }
    }
}

impl SignalProvider for TemporalSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::TemporalPatterns
    }

    fn score(
        &self,
        tx: &MerchantTransaction,
        _ctx: &SignalContext<'_>,
    ) -> Result<Option<SignalVote>> {
        // The affinity tables describe spending habits
        if !tx.transaction.is_expense() {
            return Ok(None);
        }

        let mut combined: BTreeMap<Category, f64> = BTreeMap::new();
        if let Some(seasonal) = self.rules.seasonal_affinities(tx.transaction.month()) {
            for (category, affinity) in seasonal {
                *combined.entry(*category).or_insert(0.0) += affinity * 0.5;
            }
        }
        if let Some(weekday) = self.rules.weekday_affinities(tx.transaction.weekday()) {
            for (category, affinity) in weekday {
                *combined.entry(*category).or_insert(0.0) += affinity * 0.5;
            }
        }

        let candidates = combined
            .into_iter()
            .filter(|(category, _)| direction_allows(*category, tx));

        Ok(pick_best(candidates)
            .filter(|(_, score)| *score >= self.min_affinity)
            .map(|(c, s)| SignalVote::new(c, s)))
    }
}

/// Weighted keyword buckets over merchant names and description
#[derive(Debug, Clone)]
pub struct KeywordSignal {
    rules: Arc<RuleTables>,
}

impl KeywordSignal {
    /// Score at which confidence reaches one half
    const HALF_SCORE: f64 = 3.0;
    const MAX: f64 = 0.9;

    pub fn new(rules: Arc<RuleTables>) -> Self {
        Self { rules }
    }
}

impl SignalProvider for KeywordSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::KeywordMatching
    }

    fn score(
        &self,
        tx: &MerchantTransaction,
        _ctx: &SignalContext<'_>,
    ) -> Result<Option<SignalVote>> {
        let text = format!(
            "{} {} {}",
            tx.merchant_name, tx.standardized_merchant, tx.transaction.description
        );

        let candidates = self.rules.keywords.iter().filter_map(|(category, buckets)| {
            if !direction_allows(*category, tx) {
                return None;
            }
            let score = buckets.score(&text);
            (score > 0).then_some((*category, score as f64))
        });

        Ok(pick_best(candidates).map(|(category, score)| {
            let confidence = (score / (score + Self::HALF_SCORE)).min(Self::MAX);
            SignalVote::new(category, confidence)
        }))
    }
}
