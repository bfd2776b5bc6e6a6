//! Matcher compilation
//!
//! RedisTimeSeries filters only understand label equality and inequality, so
//! the two regex operators are a permanent gap rather than a missing feature:
//! they fail the query instead of being dropped, which would silently widen
//! the result.

use std::fmt;

use crate::error::{Error, Result};
use crate::types::{LabelMatcher, MatchOp, Query};

/// One backend filter expression (`name=value` or `name!=value`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterTerm {
    /// `name=value`
    Equal {
        /// Label name
        name: String,
        /// Label value
        value: String,
    },
    /// `name!=value`
    NotEqual {
        /// Label name
        name: String,
        /// Label value
        value: String,
    },
}

impl FilterTerm {
    /// Label name the term tests
    pub fn name(&self) -> &str {
        match self {
            FilterTerm::Equal { name, .. } | FilterTerm::NotEqual { name, .. } => name,
        }
    }

    /// Whether the term is an equality test
    pub fn is_equality(&self) -> bool {
        matches!(self, FilterTerm::Equal { .. })
    }

    /// Evaluate the term against a label value (`None` when the label is absent)
    ///
    /// Follows RedisTimeSeries: `name!=value` also holds for series without
    /// the label.
    pub fn matches(&self, label_value: Option<&str>) -> bool {
        match self {
            FilterTerm::Equal { value, .. } => label_value == Some(value.as_str()),
            FilterTerm::NotEqual { value, .. } => label_value != Some(value.as_str()),
        }
    }
}

impl fmt::Display for FilterTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterTerm::Equal { name, value } => write!(f, "{}={}", name, value),
            FilterTerm::NotEqual { name, value } => write!(f, "{}!={}", name, value),
        }
    }
}

/// Compile one matcher
pub fn compile_matcher(matcher: &LabelMatcher) -> Result<FilterTerm> {
    match matcher.op {
        MatchOp::Equal => Ok(FilterTerm::Equal {
            name: matcher.name.clone(),
            value: matcher.value.clone(),
        }),
        MatchOp::NotEqual => Ok(FilterTerm::NotEqual {
            name: matcher.name.clone(),
            value: matcher.value.clone(),
        }),
        op @ (MatchOp::RegexMatch | MatchOp::RegexNoMatch) => {
            Err(Error::UnsupportedMatcher { op })
        },
    }
}

/// Compile a query's matchers, in order, stopping at the first unsupported one
pub fn compile(query: &Query) -> Result<Vec<FilterTerm>> {
    query.matchers.iter().map(compile_matcher).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_preserves_order() {
        let query = Query::new(0, 100)
            .with_matcher(LabelMatcher::equal("job", "node"))
            .with_matcher(LabelMatcher::not_equal("env", "dev"))
            .with_matcher(LabelMatcher::equal("__name__", "up"));

        let terms = compile(&query).unwrap();
        let rendered: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
        assert_eq!(rendered, vec!["job=node", "env!=dev", "__name__=up"]);
    }

    #[test]
    fn test_regex_rejected() {
        for op in [MatchOp::RegexMatch, MatchOp::RegexNoMatch] {
            let query = Query::new(0, 100)
                .with_matcher(LabelMatcher::equal("job", "node"))
                .with_matcher(LabelMatcher::new(op, "instance", "db-.*"));

            match compile(&query) {
                Err(Error::UnsupportedMatcher { op: got }) => assert_eq!(got, op),
                other => panic!("expected UnsupportedMatcher, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_empty_matchers() {
        assert!(compile(&Query::new(0, 1)).unwrap().is_empty());
    }

    #[test]
    fn test_term_evaluation() {
        let eq = compile_matcher(&LabelMatcher::equal("a", "1")).unwrap();
        let ne = compile_matcher(&LabelMatcher::not_equal("a", "1")).unwrap();

        assert!(eq.matches(Some("1")));
        assert!(!eq.matches(Some("2")));
        assert!(!eq.matches(None));

        assert!(ne.matches(Some("2")));
        assert!(ne.matches(None));
        assert!(!ne.matches(Some("1")));
        assert!(eq.is_equality() && !ne.is_equality());
        assert_eq!(ne.name(), "a");
    }
}
