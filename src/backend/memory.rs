//! In-memory backend
//!
//! A small stand-in for RedisTimeSeries used by tests and local development.
//! It follows the server's observable behaviour closely enough for the
//! adapter's purposes:
//!
//! - a series is created on first append and keeps the labels it was
//!   created with
//! - appending an existing timestamp fails (the default `BLOCK` duplicate
//!   policy)
//! - filters need at least one equality term, and `name!=value` matches
//!   series lacking the label
//! - scans return every matching series in key order, even when no sample
//!   falls in the range
//!
//! Failures can be switched on to exercise error paths. Nothing is
//! persisted.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Backend, CommandResult, RangeScan, RawValue};
use crate::error::BackendError;
use crate::types::{Label, Sample};
use crate::write::WriteCommand;

#[derive(Debug, Clone)]
struct StoredSeries {
    labels: Vec<Label>,
    /// Sorted by timestamp, unique timestamps
    samples: Vec<Sample>,
}

impl StoredSeries {
    fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }

    fn insert(&mut self, sample: Sample) -> CommandResult {
        match self
            .samples
            .binary_search_by_key(&sample.timestamp, |s| s.timestamp)
        {
            Ok(_) => Err(BackendError::Command(format!(
                "TSDB: duplicate sample at timestamp {} is blocked",
                sample.timestamp
            ))),
            Err(pos) => {
                self.samples.insert(pos, sample);
                Ok(())
            },
        }
    }
}

/// In-memory [`Backend`]
pub struct MemoryBackend {
    name: String,
    series: RwLock<BTreeMap<String, StoredSeries>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    write_calls: AtomicUsize,
    read_calls: AtomicUsize,
}

impl MemoryBackend {
    /// Create an empty backend with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            series: RwLock::new(BTreeMap::new()),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            write_calls: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent write batch fail at the transport level
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent range scan fail at the transport level
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of write round trips attempted
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Number of range scans attempted
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// Stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        self.series.read().keys().cloned().collect()
    }

    /// Samples stored under `key`
    pub fn samples(&self, key: &str) -> Option<Vec<Sample>> {
        self.series.read().get(key).map(|s| s.samples.clone())
    }

    /// Labels stored with `key`
    pub fn labels(&self, key: &str) -> Option<Vec<Label>> {
        self.series.read().get(key).map(|s| s.labels.clone())
    }

    /// Insert a raw sample, bypassing the adapter (for seeding tests)
    pub fn seed(&self, key: &str, labels: Vec<Label>, samples: &[Sample]) {
        let mut series = self.series.write();
        let entry = series.entry(key.to_string()).or_insert_with(|| StoredSeries {
            labels,
            samples: Vec::new(),
        });
        for sample in samples {
            // Seeding ignores duplicates
            let _ = entry.insert(*sample);
        }
    }

    fn row(key: &str, series: &StoredSeries, start: i64, end: i64) -> RawValue {
        let labels = series
            .labels
            .iter()
            .map(|l| {
                RawValue::Array(vec![
                    RawValue::Text(l.name.clone()),
                    RawValue::Text(l.value.clone()),
                ])
            })
            .collect();
        let samples = series
            .samples
            .iter()
            .filter(|s| s.timestamp >= start && s.timestamp <= end)
            .map(|s| {
                RawValue::Array(vec![
                    RawValue::Int(s.timestamp),
                    RawValue::Text(s.value.to_string()),
                ])
            })
            .collect();

        RawValue::Array(vec![
            RawValue::Text(key.to_string()),
            RawValue::Array(labels),
            RawValue::Array(samples),
        ])
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute_write_batch(
        &self,
        commands: &[WriteCommand],
    ) -> Result<Vec<CommandResult>, BackendError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::Connection(format!(
                "{} is unavailable",
                self.name
            )));
        }

        let mut series = self.series.write();
        let results = commands
            .iter()
            .map(|cmd| {
                let entry = series
                    .entry(cmd.key.clone())
                    .or_insert_with(|| StoredSeries {
                        labels: cmd.labels.clone(),
                        samples: Vec::new(),
                    });
                entry.insert(Sample::new(cmd.timestamp, cmd.value))
            })
            .collect();
        Ok(results)
    }

    async fn execute_range_query(&self, scan: &RangeScan) -> Result<RawValue, BackendError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BackendError::Connection(format!(
                "{} is unavailable",
                self.name
            )));
        }
        if !scan.filters.iter().any(|f| f.is_equality()) {
            return Err(BackendError::Command(
                "TSDB: please provide at least one matcher".to_string(),
            ));
        }

        let series = self.series.read();
        let rows = series
            .iter()
            .filter(|(_, s)| {
                scan.filters
                    .iter()
                    .all(|f| f.matches(s.label(f.name())))
            })
            .map(|(key, s)| Self::row(key, s, scan.start, scan.end))
            .collect();
        Ok(RawValue::Array(rows))
    }
}
