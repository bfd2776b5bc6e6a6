//! Bridge Integration Tests
//!
//! End-to-end write and read paths against the in-memory backend.
//!
//! # Test Coverage
//!
//! 1. **Write then read** - keys, storage labels, range filtering
//! 2. **Rejections** - unnamed series, non-finite samples
//! 3. **Matcher compilation** - regex matchers fail before any backend call
//! 4. **Reader configuration** - exactly one reader
//! 5. **Partial failures** - duplicate timestamps, failing writers

use std::sync::Arc;

use redis_ts_adapter::backend::MemoryBackend;
use redis_ts_adapter::bridge::Bridge;
use redis_ts_adapter::error::{BackendError, Error};
use redis_ts_adapter::observer::PrometheusObserver;
use redis_ts_adapter::types::{
    Label, LabelMatcher, LabelSet, MatchOp, Query, Sample, TimeSeries,
};

const T0: i64 = 1_700_000_000_000;

fn labels(pairs: &[(&str, &str)]) -> LabelSet {
    pairs.iter().map(|(n, v)| (*n, *v)).collect()
}

fn test_series(samples: Vec<Sample>) -> TimeSeries {
    TimeSeries::new(
        labels(&[
            ("__name__", "test_series"),
            ("label_1", "value_1"),
            ("label_2", "value_2"),
        ]),
        samples,
    )
}

// =============================================================================
// Write then read
// =============================================================================

#[tokio::test]
async fn test_write_then_read_back() {
    let backend = Arc::new(MemoryBackend::new("mem"));
    let bridge = Bridge::builder().backend(backend.clone()).build();

    let report = bridge
        .write(&[test_series(vec![
            Sample::new(T0, 42.1),
            Sample::new(T0 + 1, 43.0),
        ])])
        .await;
    assert_eq!(report.commands, 2);
    assert!(report.all_succeeded());

    let key = "test_series{label_1=value_1,label_2=value_2}";
    assert_eq!(backend.keys(), vec![key.to_string()]);
    assert_eq!(
        backend.labels(key).unwrap(),
        vec![
            Label::new("label_1", "value_1"),
            Label::new("label_2", "value_2"),
            Label::new("__name__", "test_series"),
        ]
    );

    let query = Query::new(0, T0 + 5).with_matcher(LabelMatcher::equal("label_1", "value_1"));
    let results = bridge.read(&[query]).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].timeseries.len(), 1);
    let series = &results[0].timeseries[0];
    assert_eq!(series.samples, vec![Sample::new(T0, 42.1), Sample::new(T0 + 1, 43.0)]);
    assert!(series.labels.same_pairs(&labels(&[
        ("__name__", "test_series"),
        ("label_1", "value_1"),
        ("label_2", "value_2"),
    ])));
}

#[tokio::test]
async fn test_label_order_does_not_split_series() {
    let backend = Arc::new(MemoryBackend::new("mem"));
    let bridge = Bridge::builder().backend(backend.clone()).build();

    let a = TimeSeries::new(
        labels(&[("__name__", "m"), ("x", "1"), ("y", "2")]),
        vec![Sample::new(1, 1.0)],
    );
    let b = TimeSeries::new(
        labels(&[("y", "2"), ("x", "1"), ("__name__", "m")]),
        vec![Sample::new(2, 2.0)],
    );
    bridge.write(&[a, b]).await;

    assert_eq!(backend.keys(), vec!["m{x=1,y=2}".to_string()]);
    assert_eq!(backend.samples("m{x=1,y=2}").unwrap().len(), 2);
}

#[tokio::test]
async fn test_range_bounds_inclusive() {
    let backend = Arc::new(MemoryBackend::new("mem"));
    let bridge = Bridge::builder().backend(backend).build();

    bridge
        .write(&[test_series(vec![
            Sample::new(10, 1.0),
            Sample::new(20, 2.0),
            Sample::new(30, 3.0),
        ])])
        .await;

    let query = Query::new(10, 20).with_matcher(LabelMatcher::equal("__name__", "test_series"));
    let results = bridge.read(&[query]).await.unwrap();
    let timestamps: Vec<i64> = results[0].timeseries[0]
        .samples
        .iter()
        .map(|s| s.timestamp)
        .collect();
    assert_eq!(timestamps, vec![10, 20]);
}

#[tokio::test]
async fn test_multiple_queries_answered_in_order() {
    let backend = Arc::new(MemoryBackend::new("mem"));
    let bridge = Bridge::builder().backend(backend).build();

    bridge
        .write(&[
            TimeSeries::new(labels(&[("__name__", "a")]), vec![Sample::new(1, 1.0)]),
            TimeSeries::new(labels(&[("__name__", "b")]), vec![Sample::new(1, 2.0)]),
        ])
        .await;

    let results = bridge
        .read(&[
            Query::new(0, 10).with_matcher(LabelMatcher::equal("__name__", "b")),
            Query::new(0, 10).with_matcher(LabelMatcher::equal("__name__", "missing")),
            Query::new(0, 10).with_matcher(LabelMatcher::equal("__name__", "a")),
        ])
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].timeseries[0].labels.metric_name(), Some("b"));
    assert!(results[1].timeseries.is_empty());
    assert_eq!(results[2].timeseries[0].labels.metric_name(), Some("a"));
}

#[tokio::test]
async fn test_not_equal_matcher() {
    let backend = Arc::new(MemoryBackend::new("mem"));
    let bridge = Bridge::builder().backend(backend).build();

    bridge
        .write(&[
            TimeSeries::new(
                labels(&[("__name__", "up"), ("env", "prod")]),
                vec![Sample::new(1, 1.0)],
            ),
            TimeSeries::new(
                labels(&[("__name__", "up"), ("env", "dev")]),
                vec![Sample::new(1, 0.0)],
            ),
            TimeSeries::new(labels(&[("__name__", "up")]), vec![Sample::new(1, 1.0)]),
        ])
        .await;

    let query = Query::new(0, 10)
        .with_matcher(LabelMatcher::equal("__name__", "up"))
        .with_matcher(LabelMatcher::not_equal("env", "dev"));
    let results = bridge.read(&[query]).await.unwrap();

    // Series without the label match `!=` too; rows come in key order
    // and `up{env=prod}` sorts before `up{}`
    let envs: Vec<Option<&str>> = results[0]
        .timeseries
        .iter()
        .map(|s| s.labels.get("env"))
        .collect();
    assert_eq!(envs, vec![Some("prod"), None]);
}

// =============================================================================
// Rejections
// =============================================================================

#[tokio::test]
async fn test_rejections_are_counted_not_fatal() {
    let backend = Arc::new(MemoryBackend::new("mem"));
    let observer = Arc::new(PrometheusObserver::new().unwrap());
    let bridge = Bridge::builder()
        .backend(backend.clone())
        .observer(observer.clone())
        .build();

    let report = bridge
        .write(&[
            TimeSeries::new(labels(&[("job", "orphan")]), vec![Sample::new(1, 1.0)]),
            TimeSeries::new(
                labels(&[("__name__", "m")]),
                vec![
                    Sample::new(1, f64::NAN),
                    Sample::new(2, 2.0),
                    Sample::new(3, f64::INFINITY),
                ],
            ),
        ])
        .await;

    assert_eq!(report.rejected_series, 1);
    assert_eq!(report.rejected_samples, 2);
    assert_eq!(report.commands, 1);
    assert_eq!(backend.samples("m{}").unwrap(), vec![Sample::new(2, 2.0)]);

    let text = observer.render().unwrap();
    assert!(text.contains("adapter_rejected_series_total 1"));
    assert!(text.contains("adapter_rejected_samples_total 2"));
}

// =============================================================================
// Matcher compilation
// =============================================================================

#[tokio::test]
async fn test_regex_matcher_fails_before_backend() {
    let backend = Arc::new(MemoryBackend::new("mem"));
    let bridge = Bridge::builder().backend(backend.clone()).build();

    let ok = Query::new(0, 10).with_matcher(LabelMatcher::equal("__name__", "up"));
    let bad = Query::new(0, 10).with_matcher(LabelMatcher::new(MatchOp::RegexMatch, "job", "n.*"));

    match bridge.read(&[ok, bad]).await {
        Err(Error::UnsupportedMatcher { op }) => assert_eq!(op, MatchOp::RegexMatch),
        other => panic!("expected unsupported matcher, got {:?}", other),
    }
    assert_eq!(backend.read_calls(), 0);
}

// =============================================================================
// Reader configuration
// =============================================================================

#[tokio::test]
async fn test_write_only_bridge_cannot_read() {
    let backend = Arc::new(MemoryBackend::new("mem"));
    let bridge = Bridge::builder().writer(backend.clone()).build();

    let query = Query::new(0, 10).with_matcher(LabelMatcher::equal("__name__", "up"));
    match bridge.read(&[query]).await {
        Err(Error::Configuration(msg)) => assert!(msg.contains("found 0 readers")),
        other => panic!("expected configuration error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_backend_read_failure_propagates() {
    let backend = Arc::new(MemoryBackend::new("mem"));
    backend.set_fail_reads(true);
    let bridge = Bridge::builder().backend(backend).build();

    let query = Query::new(0, 10).with_matcher(LabelMatcher::equal("__name__", "up"));
    assert!(matches!(
        bridge.read(&[query]).await,
        Err(Error::Backend(BackendError::Connection(_)))
    ));
}

// =============================================================================
// Partial failures
// =============================================================================

#[tokio::test]
async fn test_duplicate_timestamp_partial_failure() {
    let backend = Arc::new(MemoryBackend::new("mem"));
    let bridge = Bridge::builder().backend(backend.clone()).build();

    bridge.write(&[test_series(vec![Sample::new(T0, 1.0)])]).await;
    let report = bridge
        .write(&[test_series(vec![Sample::new(T0, 5.0), Sample::new(T0 + 1, 2.0)])])
        .await;

    assert!(!report.all_succeeded());
    assert_eq!(report.backends[0].failed, 1);
    assert!(matches!(
        report.backends[0].error,
        Some(BackendError::Command(_))
    ));

    let key = "test_series{label_1=value_1,label_2=value_2}";
    assert_eq!(
        backend.samples(key).unwrap(),
        vec![Sample::new(T0, 1.0), Sample::new(T0 + 1, 2.0)]
    );
}

#[tokio::test]
async fn test_failing_writer_is_isolated() {
    let healthy = Arc::new(MemoryBackend::new("healthy"));
    let broken = Arc::new(MemoryBackend::new("broken"));
    broken.set_fail_writes(true);

    let observer = Arc::new(PrometheusObserver::new().unwrap());
    let bridge = Bridge::builder()
        .writer(broken.clone())
        .backend(healthy.clone())
        .observer(observer.clone())
        .build();

    let report = bridge.write(&[test_series(vec![Sample::new(T0, 1.0)])]).await;
    assert_eq!(report.backends.len(), 2);
    assert!(!report.backends[0].is_success());
    assert!(report.backends[1].is_success());
    assert_eq!(healthy.keys().len(), 1);
    assert!(broken.keys().is_empty());

    let text = observer.render().unwrap();
    assert!(text.contains("adapter_failed_samples_total{backend=\"broken\"} 1"));
    assert!(text.contains("adapter_sent_samples_total{backend=\"healthy\"} 1"));
}
