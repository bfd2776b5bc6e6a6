//! Observer hooks for counts and durations
//!
//! The bridge reports what it did to an injected [`BridgeObserver`] instead of
//! bumping process-wide statics, so each bridge (and each test) owns its own
//! counters.
//!
//! # Example
//!
//! ```rust
//! use redis_ts_adapter::observer::{BridgeObserver, PrometheusObserver};
//! use std::time::Duration;
//!
//! let observer = PrometheusObserver::new().unwrap();
//! observer.write_completed("RedisTS", 10, 0, Duration::from_millis(3));
//! assert!(observer.render().unwrap().contains("adapter_sent_samples_total"));
//! ```

use std::time::Duration;

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};

use crate::error::Rejection;

/// Sink for bridge activity
///
/// Every hook has an empty default so implementors only override what they
/// record.
pub trait BridgeObserver: Send + Sync {
    /// A whole series was dropped from a write batch
    fn series_rejected(&self, _reason: Rejection) {}

    /// A single sample was dropped from a write batch
    fn sample_rejected(&self, _reason: Rejection) {}

    /// A backend finished (or failed) a write batch
    fn write_completed(&self, _backend: &str, _sent: usize, _failed: usize, _elapsed: Duration) {}

    /// A read request finished
    fn read_completed(&self, _queries: usize, _elapsed: Duration, _ok: bool) {}
}

/// Observer that records nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl BridgeObserver for NoopObserver {}

/// Observer backed by a private Prometheus registry
pub struct PrometheusObserver {
    registry: Registry,
    rejected_series: IntCounter,
    rejected_samples: IntCounter,
    sent_samples: IntCounterVec,
    failed_samples: IntCounterVec,
    write_duration: HistogramVec,
    read_duration: Histogram,
    failed_reads: IntCounter,
}

impl PrometheusObserver {
    /// Create an observer with a fresh registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let rejected_series = IntCounter::with_opts(Opts::new(
            "adapter_rejected_series_total",
            "Series dropped because they had no metric name",
        ))?;
        let rejected_samples = IntCounter::with_opts(Opts::new(
            "adapter_rejected_samples_total",
            "Samples dropped because their value was not finite",
        ))?;
        let sent_samples = IntCounterVec::new(
            Opts::new(
                "adapter_sent_samples_total",
                "Samples sent to a backend",
            ),
            &["backend"],
        )?;
        let failed_samples = IntCounterVec::new(
            Opts::new(
                "adapter_failed_samples_total",
                "Samples a backend failed to store",
            ),
            &["backend"],
        )?;
        let write_duration = HistogramVec::new(
            HistogramOpts::new(
                "adapter_write_duration_seconds",
                "Duration of write batches per backend",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["backend"],
        )?;
        let read_duration = Histogram::with_opts(
            HistogramOpts::new(
                "adapter_read_duration_seconds",
                "Duration of read requests",
            )
            .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0]),
        )?;
        let failed_reads = IntCounter::with_opts(Opts::new(
            "adapter_failed_reads_total",
            "Read requests that returned an error",
        ))?;

        registry.register(Box::new(rejected_series.clone()))?;
        registry.register(Box::new(rejected_samples.clone()))?;
        registry.register(Box::new(sent_samples.clone()))?;
        registry.register(Box::new(failed_samples.clone()))?;
        registry.register(Box::new(write_duration.clone()))?;
        registry.register(Box::new(read_duration.clone()))?;
        registry.register(Box::new(failed_reads.clone()))?;

        Ok(Self {
            registry,
            rejected_series,
            rejected_samples,
            sent_samples,
            failed_samples,
            write_duration,
            read_duration,
            failed_reads,
        })
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// The underlying registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl BridgeObserver for PrometheusObserver {
    fn series_rejected(&self, _reason: Rejection) {
        self.rejected_series.inc();
    }

    fn sample_rejected(&self, _reason: Rejection) {
        self.rejected_samples.inc();
    }

    fn write_completed(&self, backend: &str, sent: usize, failed: usize, elapsed: Duration) {
        self.sent_samples
            .with_label_values(&[backend])
            .inc_by(sent as u64);
        if failed > 0 {
            self.failed_samples
                .with_label_values(&[backend])
                .inc_by(failed as u64);
        }
        self.write_duration
            .with_label_values(&[backend])
            .observe(elapsed.as_secs_f64());
    }

    fn read_completed(&self, _queries: usize, elapsed: Duration, ok: bool) {
        self.read_duration.observe(elapsed.as_secs_f64());
        if !ok {
            self.failed_reads.inc();
        }
    }
}
