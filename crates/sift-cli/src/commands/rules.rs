//! Rule table inspection command

use std::path::Path;

use anyhow::Result;
use sift_core::rules::default_rules_path;

use super::common::load_rules;

pub fn cmd_rules(path: Option<&Path>) -> Result<()> {
    let rules = load_rules(path)?;

    let source = match (path, default_rules_path()) {
        (Some(p), _) => p.display().to_string(),
        (None, Some(p)) if p.exists() => p.display().to_string(),
        _ => "built-in".to_string(),
    };

    println!("📜 Rule tables");
    println!("   Version: {}", rules.version);
    println!("   Source:  {}", source);
    println!();
    println!("   Merchants:      {:>5}", rules.merchants.len());
    println!("   Amount ranges:  {:>5}", rules.amount_ranges.len());
    println!(
        "   Keyword sets:   {:>5} ({} terms)",
        rules.keywords.len(),
        rules.keywords.values().map(|k| k.len()).sum::<usize>()
    );
    println!("   Seasonal rows:  {:>5}", rules.seasonal.len());
    println!("   Weekday rows:   {:>5}", rules.weekday.len());
    println!("   Amount fits:    {:>5}", rules.amount_fit.len());

    if let Some(p) = default_rules_path() {
        if path.is_none() && !p.exists() {
            println!();
            println!("   💡 Drop a rules.toml at {} to override", p.display());
        }
    }

    Ok(())
}
