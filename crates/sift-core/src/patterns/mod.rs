//! Statistical pattern analysis over classified transactions
//!
//! Every analysis is a pure function of the batch, run over the
//! transactions in date order:
//! - Income/expense summary
//! - Recurring charges (interval analysis per merchant and amount)
//! - Spending spikes (z-scores within each expense category)
//! - Seasonal concentration of spending
//! - Category and overall month-over-month trends
//!
//! `generate_insights` turns the findings into severity-ranked insights.

mod insights;
mod recurring;
mod seasonal;
mod spikes;
mod summary;
mod trends;
pub mod types;

use tracing::debug;

pub use types::{
    CategoryTrend, FinancialSummary, Frequency, InsightType, MonthTotal, MonthlyTrend,
    PatternInsight, PatternReport, RecurringPattern, Season, SeasonalPattern, Severity,
    SpendingSpike,
};

use crate::cancel::CancelFlag;
use crate::error::{Error, Result};
use crate::models::ClassifiedTransaction;

/// Thresholds for every analysis
#[derive(Debug, Clone, PartialEq)]
pub struct PatternConfig {
    /// Fewest occurrences that can form a recurring pattern
    pub min_recurring_occurrences: usize,
    /// Mean interval range (days) for a monthly charge
    pub monthly_interval_days: (f64, f64),
    pub monthly_max_std_days: f64,
    /// Mean interval range (days) for a weekly charge
    pub weekly_interval_days: (f64, f64),
    pub weekly_max_std_days: f64,
    /// Confidence for monthly and weekly patterns
    pub regular_confidence: f64,
    /// Confidence for other regular intervals
    pub interval_confidence: f64,
    /// Fewest expenses in a category before spikes are looked for
    pub spike_min_transactions: usize,
    /// |z| above which an expense is a spike
    pub spike_z_threshold: f64,
    /// |z| above which a spike is high severity
    pub spike_high_z: f64,
    /// Season share (percent) above which a season is significant
    pub seasonal_share_threshold: f64,
    /// |trend| (percent) at which a trend becomes an insight
    pub trend_insight_threshold: f64,
    /// |trend| (percent) above which a trend is high severity
    pub trend_high_threshold: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_recurring_occurrences: 2,
            monthly_interval_days: (25.0, 31.0),
            monthly_max_std_days: 3.0,
            weekly_interval_days: (6.0, 8.0),
            weekly_max_std_days: 2.0,
            regular_confidence: 0.9,
            interval_confidence: 0.7,
            spike_min_transactions: 3,
            spike_z_threshold: 2.0,
            spike_high_z: 3.0,
            seasonal_share_threshold: 30.0,
            trend_insight_threshold: 20.0,
            trend_high_threshold: 50.0,
        }
    }
}

/// Runs the pattern analyses over a classified batch
#[derive(Debug, Clone, Default)]
pub struct PatternAnalyzer {
    config: PatternConfig,
}

impl PatternAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PatternConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    /// Run every analysis and rank the resulting insights
    pub fn analyze(&self, batch: &[ClassifiedTransaction]) -> Result<PatternReport> {
        self.run(batch, None)
    }

    /// `analyze`, giving up with `Error::Cancelled` once the flag is set
    pub fn analyze_cancellable(
        &self,
        batch: &[ClassifiedTransaction],
        cancel: &CancelFlag,
    ) -> Result<PatternReport> {
        self.run(batch, Some(cancel))
    }

    fn run(
        &self,
        batch: &[ClassifiedTransaction],
        cancel: Option<&CancelFlag>,
    ) -> Result<PatternReport> {
        if batch.is_empty() {
            return Err(Error::EmptyBatch);
        }
        let check = || match cancel {
            Some(flag) if flag.is_cancelled() => Err(Error::Cancelled),
            _ => Ok(()),
        };

        let sorted = sort_by_date(batch);

        check()?;
        let summary = summary::analyze_income_expenses(&sorted);
        check()?;
        let recurring = recurring::detect_recurring(&sorted, &self.config);
        check()?;
        let spikes = spikes::detect_spikes(&sorted, &self.config);
        check()?;
        let seasonal = seasonal::detect_seasonal(&sorted, &self.config);
        check()?;
        let category_trends = trends::category_trends(&sorted);
        let monthly_trend = trends::monthly_trend(&sorted);
        check()?;

        let insights = insights::generate(
            &recurring,
            &spikes,
            &seasonal,
            &category_trends,
            monthly_trend.as_ref(),
            &self.config,
        );

        debug!(
            transactions = batch.len(),
            recurring = recurring.len(),
            spikes = spikes.len(),
            insights = insights.len(),
            "Analyzed batch"
        );

        Ok(PatternReport {
            summary,
            insights,
            recurring,
            spikes,
            seasonal,
            category_trends,
            monthly_trend,
        })
    }

    pub fn analyze_income_expenses(&self, batch: &[ClassifiedTransaction]) -> FinancialSummary {
        summary::analyze_income_expenses(&sort_by_date(batch))
    }

    pub fn detect_recurring_transactions(
        &self,
        batch: &[ClassifiedTransaction],
    ) -> Vec<RecurringPattern> {
        recurring::detect_recurring(&sort_by_date(batch), &self.config)
    }

    pub fn detect_spending_spikes(&self, batch: &[ClassifiedTransaction]) -> Vec<SpendingSpike> {
        spikes::detect_spikes(&sort_by_date(batch), &self.config)
    }

    pub fn detect_seasonal_patterns(
        &self,
        batch: &[ClassifiedTransaction],
    ) -> Vec<SeasonalPattern> {
        seasonal::detect_seasonal(&sort_by_date(batch), &self.config)
    }

    pub fn analyze_category_trends(&self, batch: &[ClassifiedTransaction]) -> Vec<CategoryTrend> {
        trends::category_trends(&sort_by_date(batch))
    }

    pub fn analyze_monthly_trend(&self, batch: &[ClassifiedTransaction]) -> Option<MonthlyTrend> {
        trends::monthly_trend(&sort_by_date(batch))
    }

    /// Rank findings into insights
    pub fn generate_insights(
        &self,
        recurring: &[RecurringPattern],
        spikes: &[SpendingSpike],
        seasonal: &[SeasonalPattern],
        category_trends: &[CategoryTrend],
        monthly_trend: Option<&MonthlyTrend>,
    ) -> Vec<PatternInsight> {
        insights::generate(
            recurring,
            spikes,
            seasonal,
            category_trends,
            monthly_trend,
            &self.config,
        )
    }
}

/// Date ascending, ties by id
fn sort_by_date(batch: &[ClassifiedTransaction]) -> Vec<&ClassifiedTransaction> {
    let mut sorted: Vec<&ClassifiedTransaction> = batch.iter().collect();
    sorted.sort_by(|a, b| a.date().cmp(&b.date()).then_with(|| a.id().cmp(b.id())));
    sorted
}

/// Mean and population standard deviation
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
