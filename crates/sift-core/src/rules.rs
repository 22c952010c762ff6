//! Rule tables for the rule-based classifier signals
//!
//! Holds the static merchant, amount, keyword, temporal and amount-fit tables.
//! Tables are parsed and validated once, then shared read-only (`Arc`) by
//! every signal provider.
//!
//! ## Configuration Resolution
//!
//! Tables are loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/sift/config/rules.toml)
//! 2. Fall back to embedded defaults (compiled into binary)

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Weekday;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Category;

/// Embedded default tables (compiled into binary)
const DEFAULT_RULES: &str = include_str!("../../../config/rules.toml");

/// Allowed range for amount-fit multipliers
const AMOUNT_FIT_RANGE: (f64, f64) = (0.6, 1.3);

/// Coarse amount size used by the amount-fit table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AmountBucket {
    /// Under 10
    Micro,
    /// 10 to 50
    Small,
    /// 50 to 200
    Medium,
    /// 200 to 1000
    Large,
    /// 1000 and up
    XLarge,
}

impl AmountBucket {
    /// Bucket for an amount (sign is ignored)
    pub fn for_amount(amount: f64) -> Self {
        let abs = amount.abs();
        if abs < 10.0 {
            Self::Micro
        } else if abs < 50.0 {
            Self::Small
        } else if abs < 200.0 {
            Self::Medium
        } else if abs < 1000.0 {
            Self::Large
        } else {
            Self::XLarge
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Micro => "micro",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::XLarge => "xlarge",
        }
    }
}

impl std::str::FromStr for AmountBucket {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "micro" => Ok(Self::Micro),
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            "xlarge" => Ok(Self::XLarge),
            _ => Err(format!("Unknown amount bucket: {}", s)),
        }
    }
}

/// A keyword compiled to a case-insensitive, word-bounded pattern
#[derive(Debug, Clone)]
pub struct KeywordPattern {
    pub term: String,
    regex: Regex,
}

impl KeywordPattern {
    pub fn new(term: &str) -> Result<Self> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Err(Error::Config("Empty keyword in rule tables".to_string()));
        }
        let regex = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&term)))?;
        Ok(Self { term, regex })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Merchant table entry
#[derive(Debug, Clone)]
pub struct MerchantRule {
    pub category: Category,
    pub aliases: Vec<String>,
}

/// Description keywords plus the amount range typical for a category
#[derive(Debug, Clone)]
pub struct AmountRange {
    pub keywords: Vec<KeywordPattern>,
    pub min: f64,
    pub max: f64,
}

impl AmountRange {
    /// Whether the amount magnitude falls in the sweet spot
    pub fn contains(&self, amount: f64) -> bool {
        let abs = amount.abs();
        abs >= self.min && abs <= self.max
    }

    /// Number of keywords present in the text
    pub fn matches(&self, text: &str) -> usize {
        self.keywords.iter().filter(|k| k.is_match(text)).count()
    }
}

/// Weighted keyword buckets for one category
#[derive(Debug, Clone, Default)]
pub struct KeywordBuckets {
    pub high: Vec<KeywordPattern>,
    pub medium: Vec<KeywordPattern>,
    pub low: Vec<KeywordPattern>,
}

impl KeywordBuckets {
    pub const HIGH_WEIGHT: u32 = 3;
    pub const MEDIUM_WEIGHT: u32 = 2;
    pub const LOW_WEIGHT: u32 = 1;

    /// Sum of bucket weights for every keyword present in the text
    pub fn score(&self, text: &str) -> u32 {
        let hits = |patterns: &[KeywordPattern]| {
            patterns.iter().filter(|p| p.is_match(text)).count() as u32
        };
        hits(&self.high) * Self::HIGH_WEIGHT
            + hits(&self.medium) * Self::MEDIUM_WEIGHT
            + hits(&self.low) * Self::LOW_WEIGHT
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.medium.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Validated, immutable rule tables
#[derive(Debug, Clone)]
pub struct RuleTables {
    /// Table version, for tracing a classification back to its rules
    pub version: String,
    /// Standardized (lowercase) merchant name -> rule
    pub merchants: BTreeMap<String, MerchantRule>,
    pub amount_ranges: BTreeMap<Category, AmountRange>,
    pub keywords: BTreeMap<Category, KeywordBuckets>,
    /// Month (1-12) -> category affinities
    pub seasonal: BTreeMap<u32, BTreeMap<Category, f64>>,
    /// Days from Monday (0-6) -> category affinities
    pub weekday: BTreeMap<u32, BTreeMap<Category, f64>>,
    pub amount_fit: BTreeMap<(Category, AmountBucket), f64>,
}

impl RuleTables {
    /// Tables compiled into the binary
    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(DEFAULT_RULES)
    }

    /// Load tables (explicit path, then override location, then embedded)
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let path = match override_path {
            Some(path) => Some(path.to_path_buf()),
            None => default_rules_path().filter(|p| p.exists()),
        };

        match path {
            Some(path) => {
                let content = fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                let tables = Self::from_toml_str(&content)?;
                debug!(path = %path.display(), version = %tables.version, "Loaded rule tables");
                Ok(tables)
            }
            None => Self::embedded(),
        }
    }

    /// Parse and validate tables from TOML content
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawRules = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid rules TOML: {}", e)))?;
        raw.validate()
    }

    pub fn merchant(&self, name: &str) -> Option<&MerchantRule> {
        self.merchants.get(&name.trim().to_lowercase())
    }

    /// Amount-fit multiplier for a category at this amount, if the table has one
    pub fn amount_fit(&self, category: Category, amount: f64) -> Option<f64> {
        self.amount_fit
            .get(&(category, AmountBucket::for_amount(amount)))
            .copied()
    }

    pub fn seasonal_affinities(&self, month: u32) -> Option<&BTreeMap<Category, f64>> {
        self.seasonal.get(&month)
    }

    pub fn weekday_affinities(&self, day: Weekday) -> Option<&BTreeMap<Category, f64>> {
        self.weekday.get(&day.num_days_from_monday())
    }
}

/// Default rules override path
pub fn default_rules_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("sift").join("config").join("rules.toml"))
}

/// Raw table structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawRules {
    version: Option<String>,
    #[serde(default)]
    merchants: BTreeMap<String, RawMerchant>,
    #[serde(default)]
    amount_ranges: BTreeMap<String, RawAmountRange>,
    #[serde(default)]
    keywords: BTreeMap<String, RawKeywords>,
    #[serde(default)]
    seasonal: Vec<RawSeasonal>,
    #[serde(default)]
    weekday: Vec<RawWeekday>,
    #[serde(default)]
    amount_fit: Vec<RawAmountFit>,
}

#[derive(Debug, Deserialize)]
struct RawMerchant {
    category: String,
    #[serde(default)]
    aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawAmountRange {
    #[serde(default)]
    keywords: Vec<String>,
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct RawKeywords {
    #[serde(default)]
    high: Vec<String>,
    #[serde(default)]
    medium: Vec<String>,
    #[serde(default)]
    low: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawSeasonal {
    month: u32,
    category: String,
    affinity: f64,
}

#[derive(Debug, Deserialize)]
struct RawWeekday {
    day: String,
    category: String,
    affinity: f64,
}

#[derive(Debug, Deserialize)]
struct RawAmountFit {
    category: String,
    bucket: String,
    multiplier: f64,
}

fn parse_category(name: &str) -> Result<Category> {
    name.parse().map_err(Error::Config)
}

fn parse_weekday(name: &str) -> Result<Weekday> {
    name.parse()
        .map_err(|_| Error::Config(format!("Unknown weekday: {}", name)))
}

fn check_affinity(affinity: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&affinity) {
        Ok(affinity)
    } else {
        Err(Error::Config(format!(
            "Affinity {} outside 0.0-1.0",
            affinity
        )))
    }
}

fn compile(terms: &[String]) -> Result<Vec<KeywordPattern>> {
    terms.iter().map(|t| KeywordPattern::new(t)).collect()
}

impl RawRules {
    fn validate(self) -> Result<RuleTables> {
        let mut merchants = BTreeMap::new();
        for (name, raw) in self.merchants {
            let rule = MerchantRule {
                category: parse_category(&raw.category)?,
                aliases: raw
                    .aliases
                    .iter()
                    .map(|a| a.trim().to_lowercase())
                    .collect(),
            };
            merchants.insert(name.trim().to_lowercase(), rule);
        }

        let mut amount_ranges = BTreeMap::new();
        for (name, raw) in self.amount_ranges {
            if raw.min < 0.0 || raw.max < raw.min {
                return Err(Error::Config(format!(
                    "Invalid amount range for {}: {} - {}",
                    name, raw.min, raw.max
                )));
            }
            amount_ranges.insert(
                parse_category(&name)?,
                AmountRange {
                    keywords: compile(&raw.keywords)?,
                    min: raw.min,
                    max: raw.max,
                },
            );
        }

        let mut keywords = BTreeMap::new();
        for (name, raw) in self.keywords {
            keywords.insert(
                parse_category(&name)?,
                KeywordBuckets {
                    high: compile(&raw.high)?,
                    medium: compile(&raw.medium)?,
                    low: compile(&raw.low)?,
                },
            );
        }

        let mut seasonal: BTreeMap<u32, BTreeMap<Category, f64>> = BTreeMap::new();
        for entry in self.seasonal {
            if !(1..=12).contains(&entry.month) {
                return Err(Error::Config(format!("Invalid month: {}", entry.month)));
            }
            seasonal
                .entry(entry.month)
                .or_default()
                .insert(parse_category(&entry.category)?, check_affinity(entry.affinity)?);
        }

        let mut weekday: BTreeMap<u32, BTreeMap<Category, f64>> = BTreeMap::new();
        for entry in self.weekday {
            let day = parse_weekday(&entry.day)?;
            weekday
                .entry(day.num_days_from_monday())
                .or_default()
                .insert(parse_category(&entry.category)?, check_affinity(entry.affinity)?);
        }

        let mut amount_fit = BTreeMap::new();
        for entry in self.amount_fit {
            let (lo, hi) = AMOUNT_FIT_RANGE;
            if !(lo..=hi).contains(&entry.multiplier) {
                return Err(Error::Config(format!(
                    "Amount fit multiplier {} for {} outside {}-{}",
                    entry.multiplier, entry.category, lo, hi
                )));
            }
            let bucket: AmountBucket = entry.bucket.parse().map_err(Error::Config)?;
            amount_fit.insert(
                (parse_category(&entry.category)?, bucket),
                entry.multiplier,
            );
        }

        Ok(RuleTables {
            version: self.version.unwrap_or_else(|| "unversioned".to_string()),
            merchants,
            amount_ranges,
            keywords,
            seasonal,
            weekday,
            amount_fit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_embedded_rules() {
        let rules = RuleTables::embedded().unwrap();
        assert!(!rules.version.is_empty());
        assert_eq!(
            rules.merchant("Netflix").map(|r| r.category),
            Some(Category::Subscriptions)
        );
        assert!(rules.keywords.contains_key(&Category::Groceries));
        assert!(rules.seasonal_affinities(12).is_some());
        assert!(rules.weekday_affinities(Weekday::Sat).is_some());
    }

    #[test]
    fn test_amount_bucket_boundaries() {
        assert_eq!(AmountBucket::for_amount(-9.99), AmountBucket::Micro);
        assert_eq!(AmountBucket::for_amount(10.0), AmountBucket::Small);
        assert_eq!(AmountBucket::for_amount(199.99), AmountBucket::Medium);
        assert_eq!(AmountBucket::for_amount(200.0), AmountBucket::Large);
        assert_eq!(AmountBucket::for_amount(2500.0), AmountBucket::XLarge);
    }

    #[test]
    fn test_amount_fit_lookup() {
        let rules = RuleTables::embedded().unwrap();
        assert_eq!(rules.amount_fit(Category::Subscriptions, -9.99), Some(1.2));
        assert_eq!(rules.amount_fit(Category::Miscellaneous, -9.99), None);
    }

    #[test]
    fn test_keyword_pattern_word_boundaries() {
        let pattern = KeywordPattern::new("gas station").unwrap();
        assert!(pattern.is_match("SHELL GAS STATION 42"));
        assert!(!pattern.is_match("gas stationery"));

        let rent = KeywordPattern::new("rent").unwrap();
        assert!(rent.is_match("March rent"));
        assert!(!rent.is_match("current balance"));
    }

    #[test]
    fn test_keyword_buckets_score() {
        let rules = RuleTables::embedded().unwrap();
        let dining = &rules.keywords[&Category::Dining];
        // "restaurant" (high) + "pizza" (medium)
        assert_eq!(dining.score("tonys pizza restaurant"), 5);
        assert_eq!(dining.score("hardware"), 0);
    }

    #[test]
    fn test_rejects_unknown_category() {
        let content = r#"
            version = "t"
            [merchants]
            "acme" = { category = "spaceships" }
        "#;
        let err = RuleTables::from_toml_str(content).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_out_of_range_multiplier() {
        let content = r#"
            [[amount_fit]]
            category = "dining"
            bucket = "small"
            multiplier = 2.0
        "#;
        assert!(RuleTables::from_toml_str(content).is_err());
    }

    #[test]
    fn test_load_from_override_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            version = "override-1"
            [merchants]
            "corner deli" = {{ category = "dining" }}

            [[weekday]]
            day = "mon"
            category = "dining"
            affinity = 0.9
            "#
        )
        .unwrap();

        let rules = RuleTables::load(Some(file.path())).unwrap();
        assert_eq!(rules.version, "override-1");
        assert_eq!(
            rules.merchant("Corner Deli").map(|r| r.category),
            Some(Category::Dining)
        );
        assert_eq!(
            rules.weekday_affinities(Weekday::Mon).and_then(|m| m.get(&Category::Dining)),
            Some(&0.9)
        );
        assert!(rules.amount_fit.is_empty());
    }
}
