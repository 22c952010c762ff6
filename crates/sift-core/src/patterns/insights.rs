//! Severity-ranked insights from pattern findings

use serde_json::json;

use super::types::{
    CategoryTrend, InsightType, MonthlyTrend, PatternInsight, RecurringPattern, SeasonalPattern,
    Severity, SpendingSpike,
};
use super::PatternConfig;

pub(super) fn generate(
    recurring: &[RecurringPattern],
    spikes: &[SpendingSpike],
    seasonal: &[SeasonalPattern],
    category_trends: &[CategoryTrend],
    monthly_trend: Option<&MonthlyTrend>,
    config: &PatternConfig,
) -> Vec<PatternInsight> {
    let mut insights = Vec::new();

    for pattern in recurring {
        insights.push(
            PatternInsight::new(
                InsightType::Recurring,
                Severity::Medium,
                format!(
                    "{} charge of {:.2} at {}",
                    capitalize(&pattern.frequency.label()),
                    pattern.amount.abs(),
                    pattern.merchant
                ),
            )
            .with_category(pattern.category)
            .with_transactions(pattern.transaction_ids.clone())
            .with_metadata(json!({
                "frequency": pattern.frequency.label(),
                "amount": pattern.amount,
                "confidence": pattern.confidence,
                "average_interval_days": pattern.average_interval_days,
                "transaction_count": pattern.transaction_count,
            })),
        );
    }

    for spike in spikes {
        let severity = if spike.deviation.abs() > config.spike_high_z {
            Severity::High
        } else {
            Severity::Medium
        };
        insights.push(
            PatternInsight::new(
                InsightType::Spike,
                severity,
                format!(
                    "Unusual {} expense of {:.2} on {} ({:.1} standard deviations from typical)",
                    spike.category,
                    spike.amount.abs(),
                    spike.date,
                    spike.deviation.abs()
                ),
            )
            .with_category(spike.category)
            .with_transactions(vec![spike.transaction_id.clone()])
            .with_metadata(json!({
                "deviation": spike.deviation,
                "amount": spike.amount,
                "normal_range": [spike.normal_range.0, spike.normal_range.1],
            })),
        );
    }

    for season in seasonal.iter().filter(|s| s.is_significant) {
        insights.push(
            PatternInsight::new(
                InsightType::Seasonal,
                Severity::Low,
                format!(
                    "{} accounts for {:.1}% of spending",
                    capitalize(season.season.as_str()),
                    season.share_pct
                ),
            )
            .with_metadata(json!({
                "season": season.season,
                "share_pct": season.share_pct,
                "total": season.total,
                "transaction_count": season.transaction_count,
            })),
        );
    }

    for trend in category_trends {
        if trend.trend_pct.abs() < config.trend_insight_threshold {
            continue;
        }
        let (Some(first), Some(last)) = (trend.months.first(), trend.months.last()) else {
            continue;
        };
        insights.push(
            PatternInsight::new(
                InsightType::CategoryTrend,
                trend_severity(trend.trend_pct, config),
                format!(
                    "{} spending {} {:.1}% from {} to {}",
                    capitalize(trend.category.as_str()),
                    direction(trend.trend_pct),
                    trend.trend_pct.abs(),
                    first.month,
                    last.month
                ),
            )
            .with_category(trend.category)
            .with_metadata(json!({
                "trend_pct": trend.trend_pct,
                "first_month": first.month,
                "last_month": last.month,
                "first_total": first.total,
                "last_total": last.total,
            })),
        );
    }

    let overall = monthly_trend.filter(|t| t.trend_pct.abs() >= config.trend_insight_threshold);
    if let Some(trend) = overall {
        if let (Some(first), Some(last)) = (trend.months.first(), trend.months.last()) {
            insights.push(
                PatternInsight::new(
                    InsightType::Trend,
                    trend_severity(trend.trend_pct, config),
                    format!(
                        "Total spending {} {:.1}% from {} to {}",
                        direction(trend.trend_pct),
                        trend.trend_pct.abs(),
                        first.month,
                        last.month
                    ),
                )
                .with_metadata(json!({
                    "trend_pct": trend.trend_pct,
                    "first_month": first.month,
                    "last_month": last.month,
                    "months": trend.months.len(),
                })),
            );
        }
    }

    // Stable: equal severities keep generation order
    insights.sort_by(|a, b| b.severity.priority().cmp(&a.severity.priority()));
    insights
}

fn trend_severity(trend_pct: f64, config: &PatternConfig) -> Severity {
    if trend_pct.abs() > config.trend_high_threshold {
        Severity::High
    } else {
        Severity::Medium
    }
}

fn direction(trend_pct: f64) -> &'static str {
    if trend_pct >= 0.0 {
        "up"
    } else {
        "down"
    }
}

fn capitalize(s: &str) -> String {
    let s = s.replace('_', " ");
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
