//! Ensemble transaction classifier
//!
//! Five independent signals vote on a category for each transaction:
//! 1. Statistical model over engineered features (optional)
//! 2. Merchant rules (known merchant table, then extractor hint)
//! 3. Amount heuristics (description keywords x typical amount range)
//! 4. Temporal patterns (seasonal and weekday affinity)
//! 5. Keyword matching (weighted keyword buckets)
//!
//! Votes are weighted and summed per category. The winner's share of the
//! firing weight is the raw confidence, which is then calibrated by
//! agreement, merchant support, amount fit and extraction quality.

pub mod model;
pub mod signals;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

pub use model::{CentroidModel, StatisticalModel};
pub use signals::{
    AmountHeuristicsSignal, KeywordSignal, MerchantRulesSignal, ModelSignal, SignalContext,
    SignalKind, SignalProvider, SignalVote, TemporalSignal,
};

use crate::cancel::CancelFlag;
use crate::error::{Error, Result};
use crate::features::{FeatureEngineer, FeatureMatrix};
use crate::merchants::KnownMerchants;
use crate::models::{Category, CategoryDistribution, ClassifiedTransaction, MerchantTransaction};
use crate::rules::RuleTables;

/// Vote totals closer than this are treated as tied
const TIE_EPSILON: f64 = 1e-12;

/// Weight of each signal in the vote
#[derive(Debug, Clone, PartialEq)]
pub struct SignalWeights {
    pub statistical_model: f64,
    pub merchant_rules: f64,
    pub amount_heuristics: f64,
    pub temporal_patterns: f64,
    pub keyword_matching: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            statistical_model: 0.40,
            merchant_rules: 0.30,
            amount_heuristics: 0.15,
            temporal_patterns: 0.10,
            keyword_matching: 0.05,
        }
    }
}

impl SignalWeights {
    pub fn weight(&self, kind: SignalKind) -> f64 {
        match kind {
            SignalKind::StatisticalModel => self.statistical_model,
            SignalKind::MerchantRules => self.merchant_rules,
            SignalKind::AmountHeuristics => self.amount_heuristics,
            SignalKind::TemporalPatterns => self.temporal_patterns,
            SignalKind::KeywordMatching => self.keyword_matching,
        }
    }
}

/// Combination and calibration settings
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub weights: SignalWeights,
    /// Category used when nothing fires or a row fails
    pub default_category: Category,
    pub default_confidence: f64,
    pub confidence_cap: f64,
    /// Minimum share per category before renormalizing the distribution
    pub probability_floor: f64,
    /// Fraction of votes agreeing with the winner that earns the boost
    pub agreement_threshold: f64,
    pub agreement_boost: f64,
    /// Applied when the merchant rules voted for the winner
    pub merchant_boost: f64,
    /// Agreement below this is a conflict
    pub conflict_threshold: f64,
    pub conflict_penalty: f64,
    /// Extraction confidence below this is penalized
    pub low_extraction_threshold: f64,
    pub low_extraction_penalty: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            weights: SignalWeights::default(),
            default_category: Category::Miscellaneous,
            default_confidence: 0.1,
            confidence_cap: 0.98,
            probability_floor: 0.01,
            agreement_threshold: 0.8,
            agreement_boost: 1.15,
            merchant_boost: 1.20,
            conflict_threshold: 0.5,
            conflict_penalty: 0.80,
            low_extraction_threshold: 0.5,
            low_extraction_penalty: 0.90,
        }
    }
}

/// Per-row results, parallel to the input batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPrediction {
    pub categories: Vec<Category>,
    pub confidences: Vec<f64>,
    pub probabilities: Vec<CategoryDistribution>,
    /// Set for rows that fell back to the default category after an error
    pub errors: Vec<Option<String>>,
    /// Version of the rule tables that produced the prediction
    pub rules_version: String,
}

impl BatchPrediction {
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// One row's outcome
struct RowPrediction {
    category: Category,
    confidence: f64,
    probabilities: CategoryDistribution,
    error: Option<String>,
}

/// Weighted-vote ensemble over an ordered list of signal providers
pub struct EnsembleClassifier {
    rules: Arc<RuleTables>,
    providers: Vec<Box<dyn SignalProvider>>,
    model: Option<Arc<dyn StatisticalModel>>,
    features: FeatureEngineer,
    config: ClassifierConfig,
}

impl std::fmt::Debug for EnsembleClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnsembleClassifier")
            .field("rules_version", &self.rules.version)
            .field(
                "providers",
                &self.providers.iter().map(|p| p.kind()).collect::<Vec<_>>(),
            )
            .field("has_model", &self.model.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl EnsembleClassifier {
    /// Classifier with the standard five providers and no model
    pub fn new(rules: Arc<RuleTables>) -> Self {
        let providers: Vec<Box<dyn SignalProvider>> = vec![
            Box::new(ModelSignal),
            Box::new(MerchantRulesSignal::default()),
            Box::new(AmountHeuristicsSignal::new(rules.clone())),
            Box::new(TemporalSignal::new(rules.clone())),
            Box::new(KeywordSignal::new(rules.clone())),
        ];
        Self::with_providers(rules, providers)
    }

    /// Classifier with an explicit provider list (kept in priority order)
    pub fn with_providers(
        rules: Arc<RuleTables>,
        mut providers: Vec<Box<dyn SignalProvider>>,
    ) -> Self {
        providers.sort_by_key(|p| p.kind().priority());
        Self {
            rules,
            providers,
            model: None,
            features: FeatureEngineer::default(),
            config: ClassifierConfig::default(),
        }
    }

    pub fn with_model(mut self, model: Arc<dyn StatisticalModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_config(mut self, config: ClassifierConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_feature_engineer(mut self, features: FeatureEngineer) -> Self {
        self.features = features;
        self
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleTables {
        &self.rules
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Classify a batch, engineering features for the model if one is loaded
    pub fn classify(&self, batch: &[MerchantTransaction]) -> Result<BatchPrediction> {
        self.run(batch, None, None)
    }

    /// Classify a batch using precomputed features for the model signal
    pub fn classify_with_features(
        &self,
        batch: &[MerchantTransaction],
        features: Option<&FeatureMatrix>,
    ) -> Result<BatchPrediction> {
        self.run(batch, features, None)
    }

    /// Classify a batch, giving up with `Error::Cancelled` once the flag is set
    pub fn classify_cancellable(
        &self,
        batch: &[MerchantTransaction],
        cancel: &CancelFlag,
    ) -> Result<BatchPrediction> {
        self.run(batch, None, Some(cancel))
    }

    /// Classify and attach the results to each transaction
    pub fn classify_transactions(
        &self,
        batch: &[MerchantTransaction],
    ) -> Result<Vec<ClassifiedTransaction>> {
        let prediction = self.classify(batch)?;
        Ok(attach(batch, prediction))
    }

    /// `classify_transactions` with cancellation
    pub fn classify_transactions_cancellable(
        &self,
        batch: &[MerchantTransaction],
        cancel: &CancelFlag,
    ) -> Result<Vec<ClassifiedTransaction>> {
        let prediction = self.classify_cancellable(batch, cancel)?;
        Ok(attach(batch, prediction))
    }

    fn run(
        &self,
        batch: &[MerchantTransaction],
        features: Option<&FeatureMatrix>,
        cancel: Option<&CancelFlag>,
    ) -> Result<BatchPrediction> {
        if batch.is_empty() {
            return Err(Error::EmptyBatch);
        }
        if let Some(features) = features {
            features.validate(batch.len())?;
        }

        let model_predictions = self.model_predictions(batch, features);
        let known = KnownMerchants::snapshot(&self.rules, batch);

        let mut prediction = BatchPrediction {
            categories: Vec::with_capacity(batch.len()),
            confidences: Vec::with_capacity(batch.len()),
            probabilities: Vec::with_capacity(batch.len()),
            errors: Vec::with_capacity(batch.len()),
            rules_version: self.rules.version.clone(),
        };

        for (i, tx) in batch.iter().enumerate() {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                debug!(processed = i, total = batch.len(), "Classification cancelled");
                return Err(Error::Cancelled);
            }

            let ctx = SignalContext {
                known_merchants: &known,
                model_prediction: model_predictions.as_ref().and_then(|p| p.get(i).copied()),
            };

            let row = match self.classify_row(tx, &ctx) {
                Ok(row) => row,
                Err(e) => {
                    warn!(id = %tx.id(), error = %e, "Classification failed, using default category");
                    self.fallback(Some(e.to_string()))
                }
            };

            prediction.categories.push(row.category);
            prediction.confidences.push(row.confidence);
            prediction.probabilities.push(row.probabilities);
            prediction.errors.push(row.error);
        }

        debug!(
            transactions = batch.len(),
            failed = prediction.errors.iter().filter(|e| e.is_some()).count(),
            known_merchants = known.len(),
            model = model_predictions.is_some(),
            "Classified batch"
        );

        Ok(prediction)
    }

    /// Model output for every row, or `None` when the model signal is skipped
    fn model_predictions(
        &self,
        batch: &[MerchantTransaction],
        features: Option<&FeatureMatrix>,
    ) -> Option<Vec<(Category, f64)>> {
        let model = self.model.as_ref()?;

        let engineered;
        let matrix = match features {
            Some(matrix) => matrix,
            None => match self.features.engineer(batch) {
                Ok(matrix) => {
                    engineered = matrix;
                    &engineered
                }
                Err(e) => {
                    warn!(error = %e, "Feature engineering failed, skipping model signal");
                    return None;
                }
            },
        };

        match model.predict(matrix) {
            Ok((categories, confidences))
                if categories.len() == batch.len() && confidences.len() == batch.len() =>
            {
                Some(categories.into_iter().zip(confidences).collect())
            }
            Ok((categories, _)) => {
                warn!(
                    expected = batch.len(),
                    actual = categories.len(),
                    "Model returned wrong number of predictions, skipping model signal"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "Model prediction failed, skipping model signal");
                None
            }
        }
    }

    fn classify_row(
        &self,
        tx: &MerchantTransaction,
        ctx: &SignalContext<'_>,
    ) -> Result<RowPrediction> {
        if !tx.amount().is_finite() {
            return Err(Error::InvalidData(format!(
                "Non-finite amount: {}",
                tx.amount()
            )));
        }

        let mut votes: Vec<(SignalKind, SignalVote)> = Vec::new();
        for provider in &self.providers {
            match provider.score(tx, ctx) {
                Ok(Some(vote)) if vote.confidence.is_finite() && vote.confidence > 0.0 => {
                    let vote = SignalVote::new(vote.category, vote.confidence.min(1.0));
                    votes.push((provider.kind(), vote));
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(signal = %provider.kind(), id = %tx.id(), error = %e, "Signal failed");
                }
            }
        }

        Ok(self.combine(tx, &votes))
    }

    fn combine(
        &self,
        tx: &MerchantTransaction,
        votes: &[(SignalKind, SignalVote)],
    ) -> RowPrediction {
        let cfg = &self.config;

        let mut totals: BTreeMap<Category, f64> = BTreeMap::new();
        let mut fired_weight = 0.0;
        for (kind, vote) in votes {
            let weight = cfg.weights.weight(*kind);
            *totals.entry(vote.category).or_insert(0.0) += vote.confidence * weight;
            fired_weight += weight;
        }

        let Some(winner) = select_winner(&totals, votes) else {
            return self.fallback(None);
        };
        if fired_weight <= 0.0 {
            return self.fallback(None);
        }

        let mut confidence = totals[&winner] / fired_weight;

        let agreeing = votes.iter().filter(|(_, v)| v.category == winner).count();
        let agreement = agreeing as f64 / votes.len() as f64;

        if agreement >= cfg.agreement_threshold {
            confidence *= cfg.agreement_boost;
        }
        if votes
            .iter()
            .any(|(kind, v)| *kind == SignalKind::MerchantRules && v.category == winner)
        {
            confidence *= cfg.merchant_boost;
        }
        if let Some(multiplier) = self.rules.amount_fit(winner, tx.amount()) {
            confidence *= multiplier;
        }
        if agreement < cfg.conflict_threshold {
            confidence *= cfg.conflict_penalty;
        }
        if tx.transaction.metadata.merchant_confidence() < cfg.low_extraction_threshold {
            confidence *= cfg.low_extraction_penalty;
        }

        RowPrediction {
            category: winner,
            confidence: confidence.clamp(0.0, cfg.confidence_cap),
            probabilities: CategoryDistribution::from_votes(&totals, cfg.probability_floor),
            error: None,
        }
    }

    fn fallback(&self, error: Option<String>) -> RowPrediction {
        RowPrediction {
            category: self.config.default_category,
            confidence: self.config.default_confidence,
            probabilities: CategoryDistribution::uniform(),
            error,
        }
    }
}

/// Highest vote wins. Ties go to the category backed by the highest-priority
/// signal, then to the lexicographically smallest name.
fn select_winner(
    totals: &BTreeMap<Category, f64>,
    votes: &[(SignalKind, SignalVote)],
) -> Option<Category> {
    let max = totals.values().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() || max <= 0.0 {
        return None;
    }

    let best_priority = |category: Category| {
        votes
            .iter()
            .filter(|(_, v)| v.category == category)
            .map(|(kind, _)| kind.priority())
            .min()
            .unwrap_or(usize::MAX)
    };

    totals
        .iter()
        .filter(|(_, total)| (max - **total).abs() <= TIE_EPSILON)
        .map(|(category, _)| *category)
        .min_by(|a, b| {
            best_priority(*a)
                .cmp(&best_priority(*b))
                .then_with(|| a.as_str().cmp(b.as_str()))
        })
}

fn attach(
    batch: &[MerchantTransaction],
    prediction: BatchPrediction,
) -> Vec<ClassifiedTransaction> {
    batch
        .iter()
        .zip(prediction.categories)
        .zip(prediction.confidences)
        .zip(prediction.probabilities)
        .zip(prediction.errors)
        .map(|((((tx, category), confidence), probabilities), error)| {
            let mut merchant = tx.clone();
            if error.is_some() {
                merchant.transaction.metadata.classification_error = error;
            }
            ClassifiedTransaction {
                merchant,
                predicted_category: category,
                prediction_confidence: confidence,
                category_probabilities: probabilities,
            }
        })
        .collect()
}
