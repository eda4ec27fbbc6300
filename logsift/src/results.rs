use serde::Serialize;
use std::time::Duration;

/// Outcome of a search pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SearchOutcome {
    /// First matching row in the scan direction
    Match { row: usize },
    NoMatch,
    Aborted,
}

impl SearchOutcome {
    pub fn row(&self) -> Option<usize> {
        match self {
            SearchOutcome::Match { row } => Some(*row),
            _ => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, SearchOutcome::Match { .. })
    }
}

/// Outcome of a filter pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterSummary {
    /// Rows matched by a non-excluding filter
    pub matches: usize,
    /// Rows matched by an excluding filter
    pub exclude_matches: usize,
    /// The pass stopped early on an abort request
    pub aborted: bool,
}

impl FilterSummary {
    pub fn is_success(&self) -> bool {
        !self.aborted
    }
}

/// An outcome paired with the wall-clock time of its pass, serialized
/// as one flat object
#[derive(Debug, Clone, Serialize)]
pub struct TimedOutcome<T> {
    #[serde(flatten)]
    pub outcome: T,
    /// Humantime-formatted duration, millisecond resolution
    pub elapsed: String,
}

impl<T> TimedOutcome<T> {
    pub fn new(outcome: T, elapsed: Duration) -> Self {
        let truncated = Duration::from_millis(elapsed.as_millis() as u64);
        Self {
            outcome,
            elapsed: humantime::format_duration(truncated).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_outcome_row() {
        assert_eq!(SearchOutcome::Match { row: 42 }.row(), Some(42));
        assert_eq!(SearchOutcome::NoMatch.row(), None);
        assert_eq!(SearchOutcome::Aborted.row(), None);
        assert!(SearchOutcome::Match { row: 0 }.is_match());
        assert!(!SearchOutcome::Aborted.is_match());
    }

    #[test]
    fn test_search_outcome_serializes_tagged() {
        let json = serde_json::to_string(&SearchOutcome::Match { row: 7 }).unwrap();
        assert_eq!(json, r#"{"outcome":"match","row":7}"#);
        let json = serde_json::to_string(&SearchOutcome::NoMatch).unwrap();
        assert_eq!(json, r#"{"outcome":"no_match"}"#);
    }

    #[test]
    fn test_timed_outcome_serializes_flat() {
        let report = TimedOutcome::new(
            SearchOutcome::Match { row: 7 },
            Duration::from_millis(1500),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "match");
        assert_eq!(json["row"], 7);
        assert_eq!(json["elapsed"], "1s 500ms");

        let report = TimedOutcome::new(
            FilterSummary {
                matches: 3,
                exclude_matches: 1,
                aborted: false,
            },
            Duration::from_secs(2),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["matches"], 3);
        assert_eq!(json["exclude_matches"], 1);
        assert_eq!(json["elapsed"], "2s");
    }

    #[test]
    fn test_timed_outcome_truncates_to_millis() {
        let report = TimedOutcome::new(SearchOutcome::NoMatch, Duration::from_micros(2_000_900));
        assert_eq!(report.elapsed, "2s");
    }

    #[test]
    fn test_filter_summary_success() {
        let summary = FilterSummary {
            matches: 3,
            exclude_matches: 1,
            aborted: false,
        };
        assert!(summary.is_success());
        assert!(!FilterSummary {
            aborted: true,
            ..summary
        }
        .is_success());
    }
}
