//! Read assembly
//!
//! Compiles every query, runs the range scans on a single backend and turns
//! the raw replies back into series.
//!
//! # Reply schema
//!
//! A range-scan reply is decoded against a fixed shape and anything else is
//! rejected with [`BackendError::MalformedResponse`]; no element is ever
//! defaulted:
//!
//! ```text
//! reply   := [ row* ]
//! row     := [ key: text, labels, samples, ... ]
//! labels  := [ [ name: text, value: text ]* ]
//! samples := [ [ timestamp: int, value: text | double | int ]* ]
//! ```
//!
//! Rows keep backend order and samples keep backend order; nothing is
//! re-sorted here.

use std::time::Instant;

use tracing::debug;

use crate::backend::{Backend, RangeScan, RawValue};
use crate::error::{BackendError, Result};
use crate::query::compile;
use crate::types::{Label, LabelSet, Query, QueryResult, Sample, TimeSeries};

/// Answer a multi-query read request from one backend
///
/// All queries are compiled before the backend is contacted, so a single
/// unsupported matcher fails the request without any round trip.
pub async fn read(backend: &dyn Backend, queries: &[Query]) -> Result<Vec<QueryResult>> {
    let scans = queries
        .iter()
        .map(|q| -> Result<RangeScan> {
            Ok(RangeScan {
                start: q.start_timestamp_ms,
                end: q.end_timestamp_ms,
                filters: compile(q)?,
            })
        })
        .collect::<Result<Vec<RangeScan>>>()?;

    if scans.is_empty() {
        return Ok(Vec::new());
    }

    let start = Instant::now();
    let replies = backend.execute_range_queries(&scans).await?;
    if replies.len() != scans.len() {
        return Err(BackendError::MalformedResponse(format!(
            "expected {} replies, got {}",
            scans.len(),
            replies.len()
        ))
        .into());
    }
    debug!(
        storage = backend.name(),
        queries = scans.len(),
        elapsed_us = start.elapsed().as_micros() as u64,
        "Range scans completed"
    );

    replies
        .into_iter()
        .map(|reply| {
            decode_reply(reply)
                .map(|timeseries| QueryResult { timeseries })
                .map_err(Into::into)
        })
        .collect()
}

/// Decode one range-scan reply into series
pub fn decode_reply(reply: RawValue) -> std::result::Result<Vec<TimeSeries>, BackendError> {
    expect_array(reply, "reply")?
        .into_iter()
        .map(decode_row)
        .collect()
}

fn decode_row(row: RawValue) -> std::result::Result<TimeSeries, BackendError> {
    let mut fields = expect_array(row, "row")?.into_iter();
    let (Some(key), Some(labels), Some(samples)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(malformed("row has fewer than 3 elements"));
    };
    expect_text(key, "series key")?;

    let labels = expect_array(labels, "label list")?
        .into_iter()
        .map(decode_label)
        .collect::<std::result::Result<LabelSet, _>>()?;

    let samples = expect_array(samples, "sample list")?
        .into_iter()
        .map(decode_sample)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(TimeSeries::new(labels, samples))
}

fn decode_label(pair: RawValue) -> std::result::Result<Label, BackendError> {
    let [name, value] = expect_pair(pair, "label")?;
    Ok(Label::new(
        expect_text(name, "label name")?,
        expect_text(value, "label value")?,
    ))
}

fn decode_sample(pair: RawValue) -> std::result::Result<Sample, BackendError> {
    let [timestamp, value] = expect_pair(pair, "sample")?;
    let timestamp = match timestamp {
        RawValue::Int(ts) => ts,
        other => {
            return Err(malformed(format!(
                "sample timestamp must be int, got {}",
                other.kind()
            )))
        },
    };
    let value = match value {
        RawValue::Double(v) => v,
        RawValue::Int(v) => v as f64,
        RawValue::Text(s) => s
            .parse::<f64>()
            .map_err(|e| malformed(format!("sample value {:?}: {}", s, e)))?,
        other => {
            return Err(malformed(format!(
                "sample value must be numeric, got {}",
                other.kind()
            )))
        },
    };
    Ok(Sample::new(timestamp, value))
}

fn expect_array(value: RawValue, what: &str) -> std::result::Result<Vec<RawValue>, BackendError> {
    match value {
        RawValue::Array(items) => Ok(items),
        other => Err(malformed(format!(
            "{} must be array, got {}",
            what,
            other.kind()
        ))),
    }
}

fn expect_pair(value: RawValue, what: &str) -> std::result::Result<[RawValue; 2], BackendError> {
    let items = expect_array(value, what)?;
    let len = items.len();
    <[RawValue; 2]>::try_from(items)
        .map_err(|_| malformed(format!("{} must have 2 elements, got {}", what, len)))
}

fn expect_text(value: RawValue, what: &str) -> std::result::Result<String, BackendError> {
    match value {
        RawValue::Text(s) => Ok(s),
        other => Err(malformed(format!(
            "{} must be text, got {}",
            what,
            other.kind()
        ))),
    }
}

fn malformed(message: impl Into<String>) -> BackendError {
    BackendError::MalformedResponse(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    fn arr(items: Vec<RawValue>) -> RawValue {
        RawValue::Array(items)
    }

    fn row(key: &str, labels: &[(&str, &str)], samples: Vec<RawValue>) -> RawValue {
        arr(vec![
            text(key),
            arr(labels
                .iter()
                .map(|(n, v)| arr(vec![text(n), text(v)]))
                .collect()),
            arr(samples),
        ])
    }

    #[test]
    fn test_decode_well_formed_reply() {
        let reply = arr(vec![row(
            "m{a=1}",
            &[("a", "1"), ("__name__", "m")],
            vec![
                arr(vec![RawValue::Int(2), text("42.1")]),
                arr(vec![RawValue::Int(1), RawValue::Double(7.5)]),
            ],
        )]);

        let series = decode_reply(reply).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].labels.get("a"), Some("1"));
        assert_eq!(series[0].labels.metric_name(), Some("m"));
        // Backend order is kept, not re-sorted
        assert_eq!(
            series[0].samples,
            vec![Sample::new(2, 42.1), Sample::new(1, 7.5)]
        );
    }

    #[test]
    fn test_empty_reply() {
        assert!(decode_reply(arr(vec![])).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_shapes_rejected() {
        let cases = vec![
            // reply not an array
            text("OK"),
            // row too short
            arr(vec![arr(vec![text("k"), arr(vec![])])]),
            // label pair with three elements
            arr(vec![arr(vec![
                text("k"),
                arr(vec![arr(vec![text("a"), text("1"), text("x")])]),
                arr(vec![]),
            ])]),
            // label name not text
            arr(vec![row_with_label(RawValue::Int(1))]),
            // timestamp as text
            arr(vec![row("k", &[], vec![arr(vec![text("1"), text("1.0")])])]),
            // value not numeric
            arr(vec![row("k", &[], vec![arr(vec![RawValue::Int(1), text("abc")])])]),
            // value nil
            arr(vec![row("k", &[], vec![arr(vec![RawValue::Int(1), RawValue::Nil])])]),
        ];

        for case in cases {
            let result = decode_reply(case.clone());
            assert!(
                matches!(result, Err(BackendError::MalformedResponse(_))),
                "expected malformed for {:?}, got {:?}",
                case,
                result
            );
        }
    }

    fn row_with_label(name: RawValue) -> RawValue {
        arr(vec![
            text("k"),
            arr(vec![arr(vec![name, text("v")])]),
            arr(vec![]),
        ])
    }
}
