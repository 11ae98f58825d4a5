// zm-broker-core/src/severity.rs
// ============================================================================
// Module: Result Severity
// Description: The ordered severity scale used by result entries, and the
//              overall-result rollup exposed through get_test_history.
// Purpose: Keep the DEBUG-filtering and ok/warning/error/critical mapping
//          in one place instead of re-deriving it at every call site.
// Dependencies: serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

/// Severity levels the broker understands, in ascending order.
///
/// The engine also emits three lower `DEBUG` levels (`DEBUG1`..`DEBUG3` in
/// the wire format); those never reach this type; see
/// [`Level::from_engine_tag`] which returns `None` for them so callers can
/// filter the entry out entirely (§3 invariant 2, Result entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    /// Informational, never affects `overall_result`.
    Info,
    /// Notable but not a problem, never affects `overall_result`.
    Notice,
    /// A warning; raises `overall_result` to `warning` if nothing worse.
    Warning,
    /// An error; raises `overall_result` to `error` if nothing worse.
    Error,
    /// A critical failure; always yields `overall_result = critical`.
    Critical,
}

impl Level {
    /// Maps an engine-side level tag to a [`Level`], or `None` for the
    /// three `DEBUG*` levels that must be filtered at the store boundary.
    #[must_use]
    pub fn from_engine_tag(tag: &str) -> Option<Self> {
        match tag {
            "INFO" => Some(Self::Info),
            "NOTICE" => Some(Self::Notice),
            "WARNING" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// The coarse result classification returned by `get_test_history`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallResult {
    /// Highest severity observed was `INFO` or `NOTICE`, or there were no
    /// results at all.
    Ok,
    /// Highest severity observed was `WARNING`.
    Warning,
    /// Highest severity observed was `ERROR`.
    Error,
    /// Highest severity observed was `CRITICAL`.
    Critical,
}

impl OverallResult {
    /// Derives the overall result from the maximum severity among a set of
    /// already-filtered (non-`DEBUG`) levels.
    #[must_use]
    pub fn from_levels(levels: impl IntoIterator<Item = Level>) -> Self {
        match levels.into_iter().max() {
            None | Some(Level::Info | Level::Notice) => Self::Ok,
            Some(Level::Warning) => Self::Warning,
            Some(Level::Error) => Self::Error,
            Some(Level::Critical) => Self::Critical,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn debug_tags_are_filtered() {
        assert_eq!(Level::from_engine_tag("DEBUG1"), None);
        assert_eq!(Level::from_engine_tag("DEBUG2"), None);
        assert_eq!(Level::from_engine_tag("DEBUG3"), None);
    }

    #[test]
    fn overall_result_takes_the_maximum() {
        let levels = [Level::Info, Level::Warning, Level::Notice];
        assert_eq!(OverallResult::from_levels(levels), OverallResult::Warning);
    }

    #[test]
    fn overall_result_is_ok_when_only_info_and_notice() {
        let levels = [Level::Info, Level::Notice];
        assert_eq!(OverallResult::from_levels(levels), OverallResult::Ok);
    }

    #[test]
    fn overall_result_is_ok_with_no_results() {
        assert_eq!(OverallResult::from_levels([]), OverallResult::Ok);
    }

    #[test]
    fn critical_wins_over_everything() {
        let levels = [Level::Error, Level::Critical, Level::Warning];
        assert_eq!(OverallResult::from_levels(levels), OverallResult::Critical);
    }
}
