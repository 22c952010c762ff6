//! Result types for the pattern analyzer

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::models::Category;

/// Income and expense totals for a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub total_income: f64,
    /// Magnitude of all spending (positive)
    pub total_expenses: f64,
    /// Income minus expenses
    pub net_cashflow: f64,
    pub income_by_category: BTreeMap<Category, f64>,
    pub expenses_by_category: BTreeMap<Category, f64>,
    /// Category share of total expenses, in percent
    pub expense_percentages: BTreeMap<Category, f64>,
    pub transaction_count: usize,
}

/// How often a recurring charge repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Monthly,
    Weekly,
    EveryNDays(u32),
}

impl Frequency {
    pub fn label(&self) -> String {
        match self {
            Frequency::Monthly => "monthly".to_string(),
            Frequency::Weekly => "weekly".to_string(),
            Frequency::EveryNDays(n) => format!("every {} days", n),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Frequency::Monthly),
            "weekly" => Ok(Frequency::Weekly),
            other => other
                .strip_prefix("every ")
                .and_then(|rest| rest.strip_suffix(" days"))
                .and_then(|n| n.parse().ok())
                .map(Frequency::EveryNDays)
                .ok_or_else(|| format!("Unknown frequency: {}", s)),
        }
    }
}

impl Serialize for Frequency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for Frequency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The same merchant and amount at a regular interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringPattern {
    pub merchant: String,
    /// Signed amount of each occurrence
    pub amount: f64,
    /// Category of the most recent occurrence
    pub category: Category,
    pub frequency: Frequency,
    pub confidence: f64,
    pub average_interval_days: f64,
    pub interval_std_days: f64,
    pub transaction_count: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub transaction_ids: Vec<String>,
}

/// An expense far outside its category's usual size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendingSpike {
    pub transaction_id: String,
    pub category: Category,
    pub date: NaiveDate,
    pub amount: f64,
    /// Z-score of the expense magnitude within its category
    pub deviation: f64,
    /// One standard deviation either side of the category mean
    pub normal_range: (f64, f64),
}

/// Meteorological season (northern hemisphere)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    pub fn for_month(month: u32) -> Self {
        match month {
            12 | 1 | 2 => Season::Winter,
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            _ => Season::Autumn,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Spending concentrated in one season
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalPattern {
    pub season: Season,
    pub total: f64,
    /// Share of all expenses, in percent
    pub share_pct: f64,
    pub transaction_count: usize,
    pub is_significant: bool,
}

/// Expense total for one calendar month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthTotal {
    /// YYYY-MM
    pub month: String,
    pub total: f64,
}

/// First-to-last month change in a category's spending
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTrend {
    pub category: Category,
    pub months: Vec<MonthTotal>,
    pub trend_pct: f64,
}

/// First-to-last month change in total spending
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTrend {
    pub months: Vec<MonthTotal>,
    pub trend_pct: f64,
}

/// Kinds of insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Recurring,
    Spike,
    Trend,
    Seasonal,
    CategoryTrend,
}

impl InsightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightType::Recurring => "recurring",
            InsightType::Spike => "spike",
            InsightType::Trend => "trend",
            InsightType::Seasonal => "seasonal",
            InsightType::CategoryTrend => "category_trend",
        }
    }
}

impl fmt::Display for InsightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InsightType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recurring" => Ok(InsightType::Recurring),
            "spike" => Ok(InsightType::Spike),
            "trend" => Ok(InsightType::Trend),
            "seasonal" => Ok(InsightType::Seasonal),
            "category_trend" => Ok(InsightType::CategoryTrend),
            _ => Err(format!("Unknown insight type: {}", s)),
        }
    }
}

/// How much an insight deserves attention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// Numeric priority for sorting (higher = more urgent)
    pub fn priority(&self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// A severity-ranked finding with its evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternInsight {
    pub insight_type: InsightType,
    pub category: Option<Category>,
    pub description: String,
    pub severity: Severity,
    pub transaction_ids: Vec<String>,
    /// Insight-specific evidence (frequency, deviation, trend_pct, share_pct)
    pub metadata: serde_json::Value,
}

impl PatternInsight {
    pub fn new(insight_type: InsightType, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            insight_type,
            category: None,
            description: description.into(),
            severity,
            transaction_ids: Vec::new(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_transactions(mut self, ids: Vec<String>) -> Self {
        self.transaction_ids = ids;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Everything the analyzer found in one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternReport {
    pub summary: FinancialSummary,
    pub insights: Vec<PatternInsight>,
    pub recurring: Vec<RecurringPattern>,
    pub spikes: Vec<SpendingSpike>,
    pub seasonal: Vec<SeasonalPattern>,
    pub category_trends: Vec<CategoryTrend>,
    pub monthly_trend: Option<MonthlyTrend>,
}
