//! Utility functions shared across the codebase

pub mod math;

// Re-export commonly used utilities
pub use math::{clamp_unit, mean, std_dev};

/// Closest known label by Jaro-Winkler similarity, if any is reasonably close.
pub fn closest_match<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let input = input.trim().to_lowercase();
    candidates
        .iter()
        .map(|c| (*c, strsim::jaro_winkler(&input, c)))
        .filter(|(_, score)| *score >= 0.6)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest_match() {
        assert_eq!(closest_match("1dd", &["1h", "1d", "1w", "1m"]), Some("1d"));
        assert_eq!(closest_match("weekly-ish", &["1h", "1d"]), None);
    }
}
