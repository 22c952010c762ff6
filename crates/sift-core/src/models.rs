//! Data models for Sift
//!
//! Transactions move through three shapes in one direction:
//! `Transaction` (ingested) -> `MerchantTransaction` (merchant annotated
//! upstream) -> `ClassifiedTransaction` (category assigned here). Every
//! value is created fresh per batch and never updated in place.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Spending/income category assigned by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Groceries,
    Dining,
    Fuel,
    Transportation,
    Shopping,
    Entertainment,
    Subscriptions,
    Utilities,
    Housing,
    Healthcare,
    Insurance,
    Travel,
    Education,
    PersonalCare,
    Salary,
    Investment,
    Transfer,
    Miscellaneous,
}

impl Category {
    /// Every category, in declaration order
    pub const ALL: [Category; 18] = [
        Self::Groceries,
        Self::Dining,
        Self::Fuel,
        Self::Transportation,
        Self::Shopping,
        Self::Entertainment,
        Self::Subscriptions,
        Self::Utilities,
        Self::Housing,
        Self::Healthcare,
        Self::Insurance,
        Self::Travel,
        Self::Education,
        Self::PersonalCare,
        Self::Salary,
        Self::Investment,
        Self::Transfer,
        Self::Miscellaneous,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groceries => "groceries",
            Self::Dining => "dining",
            Self::Fuel => "fuel",
            Self::Transportation => "transportation",
            Self::Shopping => "shopping",
            Self::Entertainment => "entertainment",
            Self::Subscriptions => "subscriptions",
            Self::Utilities => "utilities",
            Self::Housing => "housing",
            Self::Healthcare => "healthcare",
            Self::Insurance => "insurance",
            Self::Travel => "travel",
            Self::Education => "education",
            Self::PersonalCare => "personal_care",
            Self::Salary => "salary",
            Self::Investment => "investment",
            Self::Transfer => "transfer",
            Self::Miscellaneous => "miscellaneous",
        }
    }

    /// Income categories only make sense for positive amounts
    pub fn is_income(&self) -> bool {
        matches!(self, Self::Salary | Self::Investment)
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "groceries" | "grocery" => Ok(Self::Groceries),
            "dining" | "food" | "restaurants" | "restaurant" => Ok(Self::Dining),
            "fuel" | "gas" => Ok(Self::Fuel),
            "transportation" | "transport" => Ok(Self::Transportation),
            "shopping" => Ok(Self::Shopping),
            "entertainment" => Ok(Self::Entertainment),
            "subscriptions" | "subscription" => Ok(Self::Subscriptions),
            "utilities" | "utility" => Ok(Self::Utilities),
            "housing" | "rent" => Ok(Self::Housing),
            "healthcare" | "health" | "medical" => Ok(Self::Healthcare),
            "insurance" => Ok(Self::Insurance),
            "travel" => Ok(Self::Travel),
            "education" => Ok(Self::Education),
            "personal_care" => Ok(Self::PersonalCare),
            "salary" | "income" => Ok(Self::Salary),
            "investment" | "investments" => Ok(Self::Investment),
            "transfer" | "transfers" => Ok(Self::Transfer),
            "miscellaneous" | "misc" | "other" => Ok(Self::Miscellaneous),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment method used for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    DebitCard,
    CreditCard,
    BankTransfer,
    /// Apple Pay, Google Pay and similar mobile wallets
    DigitalWallet,
    /// Online/card-not-present
    Online,
    Check,
    Other,
}

/// Coarse grouping of payment methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentGroup {
    Card,
    Cash,
    Digital,
    Other,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 8] = [
        Self::Cash,
        Self::DebitCard,
        Self::CreditCard,
        Self::BankTransfer,
        Self::DigitalWallet,
        Self::Online,
        Self::Check,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::DebitCard => "debit_card",
            Self::CreditCard => "credit_card",
            Self::BankTransfer => "bank_transfer",
            Self::DigitalWallet => "digital_wallet",
            Self::Online => "online",
            Self::Check => "check",
            Self::Other => "other",
        }
    }

    pub fn group(&self) -> PaymentGroup {
        match self {
            Self::DebitCard | Self::CreditCard => PaymentGroup::Card,
            Self::Cash | Self::Check => PaymentGroup::Cash,
            Self::DigitalWallet | Self::Online | Self::BankTransfer => PaymentGroup::Digital,
            Self::Other => PaymentGroup::Other,
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cash" => Ok(Self::Cash),
            "debit_card" | "debit" => Ok(Self::DebitCard),
            "credit_card" | "credit" => Ok(Self::CreditCard),
            "bank_transfer" | "transfer" => Ok(Self::BankTransfer),
            "digital_wallet" | "apple_pay" | "google_pay" => Ok(Self::DigitalWallet),
            "online" => Ok(Self::Online),
            "check" | "cheque" => Ok(Self::Check),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown payment method: {}", s)),
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed metadata carried alongside a transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    /// Confidence reported by the upstream merchant extractor (absent = 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_extraction_confidence: Option<f64>,
    /// Set when classification of this row failed and the default was used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification_error: Option<String>,
    /// Free-form diagnostics only; nothing in the pipeline reads from here
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub diagnostics: BTreeMap<String, serde_json::Value>,
}

impl TransactionMetadata {
    pub fn merchant_confidence(&self) -> f64 {
        self.merchant_extraction_confidence.unwrap_or(1.0)
    }
}

/// A financial transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub date: NaiveDate,
    /// Negative = expense, positive = income
    pub amount: f64,
    pub payment_method: PaymentMethod,
    /// Cleaned description text
    pub description: String,
    #[serde(default)]
    pub has_discount: bool,
    /// Discount as a percentage (e.g. 15.0 for 15%)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_percentage: Option<f64>,
    #[serde(default)]
    pub metadata: TransactionMetadata,
}

impl Transaction {
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }

    pub fn day(&self) -> u32 {
        self.date.day()
    }

    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }

    pub fn is_weekend(&self) -> bool {
        matches!(self.weekday(), Weekday::Sat | Weekday::Sun)
    }

    pub fn is_income(&self) -> bool {
        self.amount > 0.0
    }

    pub fn is_expense(&self) -> bool {
        self.amount < 0.0
    }
}

/// A transaction annotated by the upstream merchant extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub merchant_name: String,
    pub standardized_merchant: String,
    /// Category hint from the extractor (free text, parsed leniently)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_category_hint: Option<String>,
    #[serde(default)]
    pub merchant_is_known: bool,
}

impl MerchantTransaction {
    pub fn id(&self) -> &str {
        &self.transaction.id
    }

    pub fn amount(&self) -> f64 {
        self.transaction.amount
    }

    pub fn date(&self) -> NaiveDate {
        self.transaction.date
    }

    /// Parsed category hint, if the extractor supplied a recognizable one
    pub fn category_hint(&self) -> Option<Category> {
        self.merchant_category_hint
            .as_deref()
            .and_then(|hint| hint.parse().ok())
    }
}

/// Probability for every category; always sums to 1.0
///
/// Built only through `uniform`, `from_votes` or a checked deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<Category, f64>",
    into = "BTreeMap<Category, f64>"
)]
pub struct CategoryDistribution(BTreeMap<Category, f64>);

impl CategoryDistribution {
    /// Equal probability for every category
    pub fn uniform() -> Self {
        let p = 1.0 / Category::ALL.len() as f64;
        Self(Category::ALL.iter().map(|c| (*c, p)).collect())
    }

    /// Normalize vote totals over all categories.
    ///
    /// Each share is floored at `floor` before renormalizing so no category
    /// ends up with zero probability. With no votes at all the result is
    /// uniform.
    pub fn from_votes(votes: &BTreeMap<Category, f64>, floor: f64) -> Self {
        let total: f64 = votes.values().filter(|v| **v > 0.0).sum();
        if total <= 0.0 {
            return Self::uniform();
        }

        let floored: BTreeMap<Category, f64> = Category::ALL
            .iter()
            .map(|c| {
                let share = votes.get(c).copied().unwrap_or(0.0).max(0.0) / total;
                (*c, share.max(floor))
            })
            .collect();

        let sum: f64 = floored.values().sum();
        Self(floored.into_iter().map(|(c, p)| (c, p / sum)).collect())
    }

    pub fn get(&self, category: Category) -> f64 {
        self.0.get(&category).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Category, &f64)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Most likely category; ties go to the lexicographically smaller name
    pub fn most_likely(&self) -> Option<(Category, f64)> {
        self.0
            .iter()
            .max_by(|a, b| {
                a.1.total_cmp(b.1)
                    .then_with(|| b.0.as_str().cmp(a.0.as_str()))
            })
            .map(|(c, p)| (*c, *p))
    }
}

impl CategoryDistribution {
    /// Tolerance on the sum when checking a distribution from outside
    const SUM_TOLERANCE: f64 = 1e-6;

    /// Wrap probabilities the caller already normalized over every category
    pub(crate) fn from_normalized(map: BTreeMap<Category, f64>) -> Self {
        Self(map)
    }
}

impl TryFrom<BTreeMap<Category, f64>> for CategoryDistribution {
    type Error = Error;

    fn try_from(map: BTreeMap<Category, f64>) -> Result<Self> {
        if let Some(missing) = Category::ALL.iter().find(|c| !map.contains_key(c)) {
            return Err(Error::InvalidData(format!(
                "Distribution is missing category {}",
                missing
            )));
        }
        if let Some((category, p)) = map.iter().find(|(_, p)| !(p.is_finite() && **p >= 0.0)) {
            return Err(Error::InvalidData(format!(
                "Invalid probability {} for {}",
                p, category
            )));
        }
        let total: f64 = map.values().sum();
        if (total - 1.0).abs() > Self::SUM_TOLERANCE {
            return Err(Error::InvalidData(format!(
                "Distribution sums to {}, not 1",
                total
            )));
        }
        Ok(Self(map))
    }
}

impl From<CategoryDistribution> for BTreeMap<Category, f64> {
    fn from(dist: CategoryDistribution) -> Self {
        dist.0
    }
}

/// A merchant transaction with its predicted category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedTransaction {
    #[serde(flatten)]
    pub merchant: MerchantTransaction,
    pub predicted_category: Category,
    /// 0.0 to 0.98
    pub prediction_confidence: f64,
    pub category_probabilities: CategoryDistribution,
}

impl ClassifiedTransaction {
    pub fn id(&self) -> &str {
        self.merchant.id()
    }

    pub fn amount(&self) -> f64 {
        self.merchant.amount()
    }

    pub fn date(&self) -> NaiveDate {
        self.merchant.date()
    }

    pub fn standardized_merchant(&self) -> &str {
        &self.merchant.standardized_merchant
    }
}
