//! Core data types shared by the write and read paths
//!
//! # Key Types
//!
//! - **`Label`**: a `name=value` pair attached to a series
//! - **`LabelSet`**: the labels identifying one series, names unique
//! - **`Sample`**: one measurement (millisecond timestamp + value)
//! - **`TimeSeries`**: a label set with its samples, the unit of both
//!   inbound writes and read results
//! - **`LabelMatcher`** / **`Query`**: read-side predicates over a time range
//! - **`QueryResult`**: the series returned for one query
//!
//! All of these are built per request and dropped once the response is
//! produced.
//!
//! # Example
//!
//! ```rust
//! use redis_ts_adapter::types::{LabelSet, Sample, TimeSeries};
//!
//! let labels: LabelSet = [("__name__", "up"), ("job", "node")].into_iter().collect();
//! let series = TimeSeries::new(labels, vec![Sample::new(1_000, 1.0)]);
//! assert_eq!(series.labels.metric_name(), Some("up"));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved label carrying the human-readable metric name
pub const METRIC_NAME_LABEL: &str = "__name__";

/// A single `name=value` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label {
    /// Label name
    pub name: String,
    /// Label value
    pub value: String,
}

impl Label {
    /// Create a new label
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Whether this is the reserved metric-name label
    pub fn is_metric_name(&self) -> bool {
        self.name == METRIC_NAME_LABEL
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Labels identifying a series
///
/// Behaves like a mapping: names are unique and inserting an existing name
/// replaces its value in place. Iteration follows first-insertion order so a
/// label set read back from the backend keeps the backend's order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    labels: Vec<Label>,
}

impl LabelSet {
    /// Create an empty label set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a label, replacing the value if the name is already present
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.labels.iter_mut().find(|l| l.name == name) {
            Some(existing) => existing.value = value,
            None => self.labels.push(Label { name, value }),
        }
    }

    /// Look up a label value by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }

    /// Value of the metric-name label, if present
    pub fn metric_name(&self) -> Option<&str> {
        self.get(METRIC_NAME_LABEL)
    }

    /// Iterate over labels in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, Label> {
        self.labels.iter()
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the set has no labels
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Consume the set, returning its labels
    pub fn into_labels(self) -> Vec<Label> {
        self.labels
    }

    /// Whether both sets hold the same name/value pairs, ignoring order
    pub fn same_pairs(&self, other: &LabelSet) -> bool {
        self.len() == other.len()
            && self
                .labels
                .iter()
                .all(|l| other.get(&l.name) == Some(l.value.as_str()))
    }
}

impl From<Vec<Label>> for LabelSet {
    fn from(labels: Vec<Label>) -> Self {
        labels.into_iter().collect()
    }
}

impl FromIterator<Label> for LabelSet {
    fn from_iter<I: IntoIterator<Item = Label>>(iter: I) -> Self {
        let mut set = LabelSet::new();
        for label in iter {
            set.insert(label.name, label.value);
        }
        set
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut set = LabelSet::new();
        for (name, value) in iter {
            set.insert(name, value);
        }
        set
    }
}

impl<'a> IntoIterator for &'a LabelSet {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.labels.iter()
    }
}

/// A single measurement
///
/// Timestamps are milliseconds since the Unix epoch, the unit of the remote
/// storage protocol. Any backend needing another unit converts inside its
/// transport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Sample value
    pub value: f64,
}

impl Sample {
    /// Create a new sample
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// A label set together with its samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Series labels
    pub labels: LabelSet,
    /// Samples in the order received (or returned by the backend)
    pub samples: Vec<Sample>,
}

impl TimeSeries {
    /// Create a new series
    pub fn new(labels: LabelSet, samples: Vec<Sample>) -> Self {
        Self { labels, samples }
    }
}

/// Matcher operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchOp {
    /// `name = value`
    Equal,
    /// `name != value`
    NotEqual,
    /// `name =~ regex`
    RegexMatch,
    /// `name !~ regex`
    RegexNoMatch,
}

impl fmt::Display for MatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchOp::Equal => write!(f, "equal"),
            MatchOp::NotEqual => write!(f, "not-equal"),
            MatchOp::RegexMatch => write!(f, "regex-equal"),
            MatchOp::RegexNoMatch => write!(f, "regex-non-equal"),
        }
    }
}

/// A tag predicate used to select series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMatcher {
    /// Comparison operator
    pub op: MatchOp,
    /// Label name
    pub name: String,
    /// Value (or pattern for the regex operators)
    pub value: String,
}

impl LabelMatcher {
    /// Create a matcher
    pub fn new(op: MatchOp, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            op,
            name: name.into(),
            value: value.into(),
        }
    }

    /// `name = value`
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(MatchOp::Equal, name, value)
    }

    /// `name != value`
    pub fn not_equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(MatchOp::NotEqual, name, value)
    }
}

/// A range query: inclusive `[start, end]` in milliseconds, matchers ANDed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Range start (inclusive, ms)
    pub start_timestamp_ms: i64,
    /// Range end (inclusive, ms)
    pub end_timestamp_ms: i64,
    /// Predicates, all of which must hold
    pub matchers: Vec<LabelMatcher>,
}

impl Query {
    /// Create a query over `[start, end]`
    pub fn new(start_timestamp_ms: i64, end_timestamp_ms: i64) -> Self {
        Self {
            start_timestamp_ms,
            end_timestamp_ms,
            matchers: Vec::new(),
        }
    }

    /// Add a matcher
    pub fn with_matcher(mut self, matcher: LabelMatcher) -> Self {
        self.matchers.push(matcher);
        self
    }
}

/// Series returned for one query, in backend row order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Matching series
    pub timeseries: Vec<TimeSeries>,
}
