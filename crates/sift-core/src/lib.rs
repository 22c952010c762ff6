//! Sift Core Library
//!
//! Transaction classification and spending pattern analysis:
//! - Typed transaction model at each pipeline stage
//! - Versioned rule tables (merchants, keywords, temporal affinity, amount fit)
//! - Feature engineering for statistical models
//! - Ensemble classifier fusing five weighted signals
//! - Pattern analyzer for recurring charges, spikes, seasons and trends
//!
//! The core does no I/O once rule tables are loaded. Classifier and analyzer
//! are stateless across calls and can be shared between threads.

pub mod cancel;
pub mod classifier;
pub mod error;
pub mod features;
pub mod merchants;
pub mod models;
pub mod patterns;
pub mod rules;

#[cfg(test)]
mod test_utils;

#[cfg(test)]
mod tests;

pub use cancel::CancelFlag;
pub use classifier::{
    BatchPrediction, CentroidModel, ClassifierConfig, EnsembleClassifier, SignalKind,
    SignalProvider, SignalVote, SignalWeights, StatisticalModel,
};
pub use error::{Error, Result};
pub use features::{FeatureConfig, FeatureEngineer, FeatureMatrix, TextEmbedder};
pub use merchants::{KnownMerchants, MatchKind, MerchantMatch};
pub use models::{
    Category, CategoryDistribution, ClassifiedTransaction, MerchantTransaction, PaymentGroup,
    PaymentMethod, Transaction, TransactionMetadata,
};
pub use patterns::{
    FinancialSummary, Frequency, InsightType, PatternAnalyzer, PatternConfig, PatternInsight,
    PatternReport, RecurringPattern, SeasonalPattern, Severity, SpendingSpike,
};
pub use rules::RuleTables;
