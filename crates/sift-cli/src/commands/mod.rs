//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `analyze` - Pattern analysis (analyze, run)
//! - `classify` - Batch classification
//! - `common` - Shared utilities (rule/model loading, JSON I/O, timeouts)
//! - `rules` - Rule table inspection
//! - `train` - Centroid model training

pub mod analyze;
pub mod classify;
pub mod common;
pub mod rules;
pub mod train;

// Re-export command functions for main.rs
pub use analyze::*;
pub use classify::*;
pub use common::*;
pub use rules::*;
pub use train::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
