//! Translation of list requests into store predicates and row ranges.
//!
//! Everything here is pure: the same filter always produces the same
//! predicate, and stores are free to evaluate it locally or ship it over
//! the wire.

use crate::companion::CompanionRecord;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;

/// Companion columns a predicate can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Name,
    Subject,
    Topic,
}

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Name => "name",
            Column::Subject => "subject",
            Column::Topic => "topic",
        }
    }

    fn value<'a>(&self, record: &'a CompanionRecord) -> &'a str {
        match self {
            Column::Name => &record.name,
            Column::Subject => &record.subject,
            Column::Topic => &record.topic,
        }
    }
}

/// A filter over companion rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    MatchAll,
    /// Case-insensitive substring match.
    Contains { column: Column, needle: String },
    Or(Vec<Predicate>),
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn contains(column: Column, needle: &str) -> Self {
        Predicate::Contains {
            column,
            needle: needle.to_string(),
        }
    }

    /// Topic-or-name substring match used by the topic search box.
    pub fn topic_or_name(needle: &str) -> Self {
        Predicate::Or(vec![
            Predicate::contains(Column::Topic, needle),
            Predicate::contains(Column::Name, needle),
        ])
    }

    pub fn matches(&self, record: &CompanionRecord) -> bool {
        match self {
            Predicate::MatchAll => true,
            Predicate::Contains { column, needle } => column
                .value(record)
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            Predicate::Or(parts) => parts.iter().any(|p| p.matches(record)),
            Predicate::And(parts) => parts.iter().all(|p| p.matches(record)),
        }
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Builds the companion filter for an optional subject and topic.
///
/// Empty strings count as absent. With both present the subject must match
/// and the topic must match either the topic or the name column.
pub fn build_filter_query(subject: Option<&str>, topic: Option<&str>) -> Predicate {
    match (present(subject), present(topic)) {
        (Some(subject), Some(topic)) => Predicate::And(vec![
            Predicate::contains(Column::Subject, subject),
            Predicate::topic_or_name(topic),
        ]),
        (Some(subject), None) => Predicate::contains(Column::Subject, subject),
        (None, Some(topic)) => Predicate::topic_or_name(topic),
        (None, None) => Predicate::MatchAll,
    }
}

/// Inclusive row index range, `start..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

impl RowRange {
    /// Number of rows the range covers.
    pub fn count(&self) -> usize {
        (self.end - self.start).saturating_add(1)
    }
}

/// Converts a 1-indexed page and page size into a row range.
///
/// Missing values fall back to page 1 and 10 rows; non-positive values are
/// clamped to 1. Bounds saturate at `usize::MAX`, so a page past the end of
/// any table just selects nothing.
pub fn paginate(page: Option<i64>, limit: Option<i64>) -> RowRange {
    let page = to_index(page.unwrap_or(DEFAULT_PAGE));
    let limit = to_index(limit.unwrap_or(DEFAULT_LIMIT));
    let start = (page - 1).saturating_mul(limit);
    RowRange {
        start,
        end: start.saturating_add(limit - 1),
    }
}

fn to_index(value: i64) -> usize {
    usize::try_from(value.max(1)).unwrap_or(usize::MAX)
}

/// A list request as it arrives from the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    pub subject: Option<String>,
    pub topic: Option<String>,
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    pub fn with_topic(mut self, topic: &str) -> Self {
        self.topic = Some(topic.to_string());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn predicate(&self) -> Predicate {
        build_filter_query(self.subject.as_deref(), self.topic.as_deref())
    }

    pub fn range(&self) -> RowRange {
        paginate(self.page, self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, subject: &str, topic: &str) -> CompanionRecord {
        CompanionRecord {
            id: name.to_lowercase(),
            name: name.to_string(),
            subject: subject.to_string(),
            topic: topic.to_string(),
            style: "casual".to_string(),
            voice: "female".to_string(),
            duration: 15,
            color: None,
            author: "u1".to_string(),
        }
    }

    #[test]
    fn test_filter_with_subject_and_topic() {
        let predicate = build_filter_query(Some("math"), Some("deriv"));
        assert_eq!(
            predicate,
            Predicate::And(vec![
                Predicate::contains(Column::Subject, "math"),
                Predicate::topic_or_name("deriv"),
            ])
        );
    }

    #[test]
    fn test_filter_with_subject_only() {
        assert_eq!(
            build_filter_query(Some("math"), Some("")),
            Predicate::contains(Column::Subject, "math")
        );
        assert_eq!(
            build_filter_query(Some("math"), None),
            Predicate::contains(Column::Subject, "math")
        );
    }

    #[test]
    fn test_filter_with_topic_only() {
        assert_eq!(
            build_filter_query(None, Some("cells")),
            Predicate::topic_or_name("cells")
        );
        assert_eq!(
            build_filter_query(Some(""), Some("cells")),
            Predicate::topic_or_name("cells")
        );
    }

    #[test]
    fn test_filter_without_constraints() {
        assert_eq!(build_filter_query(None, None), Predicate::MatchAll);
        assert_eq!(build_filter_query(Some(""), Some("")), Predicate::MatchAll);
    }

    #[test]
    fn test_predicate_matches_case_insensitively() {
        let countsy = record("Countsy", "Maths", "Derivatives and Integrals");
        let neura = record("Neura the Brainy", "science", "Neural networks");

        let predicate = build_filter_query(Some("MATH"), Some("integral"));
        assert!(predicate.matches(&countsy));
        assert!(!predicate.matches(&neura));

        // Topic also searches the companion name.
        let by_name = build_filter_query(None, Some("brainy"));
        assert!(by_name.matches(&neura));
        assert!(!by_name.matches(&countsy));

        assert!(Predicate::MatchAll.matches(&countsy));
    }

    #[test]
    fn test_paginate_ranges() {
        assert_eq!(paginate(Some(1), Some(10)), RowRange { start: 0, end: 9 });
        assert_eq!(paginate(Some(3), Some(5)), RowRange { start: 10, end: 14 });
        assert_eq!(paginate(None, None), RowRange { start: 0, end: 9 });
        assert_eq!(paginate(Some(3), Some(5)).count(), 5);
    }

    #[test]
    fn test_paginate_clamps_non_positive_values() {
        assert_eq!(paginate(Some(0), Some(10)), RowRange { start: 0, end: 9 });
        assert_eq!(paginate(Some(-2), Some(0)), RowRange { start: 0, end: 0 });
        assert_eq!(paginate(Some(2), Some(-5)), RowRange { start: 1, end: 1 });
    }

    #[test]
    fn test_paginate_saturates_huge_values() {
        let far = paginate(Some(i64::MAX), Some(10));
        assert!(far.end >= far.start);
        assert!(far.count() <= 10);

        let wide = paginate(Some(2), Some(i64::MAX));
        assert_eq!(wide.start, i64::MAX as usize);
        assert!(wide.end >= wide.start);

        let both = paginate(Some(i64::MAX), Some(i64::MAX));
        assert_eq!(both, RowRange { start: usize::MAX, end: usize::MAX });
        assert_eq!(both.count(), 1);
    }

    #[test]
    fn test_query_filter_builder() {
        let filter = QueryFilter::new().with_subject("science").with_limit(3).with_page(2);
        assert_eq!(filter.predicate(), Predicate::contains(Column::Subject, "science"));
        assert_eq!(filter.range(), RowRange { start: 3, end: 5 });
    }
}
