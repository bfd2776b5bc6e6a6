//! Bridge orchestration
//!
//! Wires decoded requests to the write translator and the read assembler.
//!
//! # Writes
//!
//! A batch is translated once and then sent to every configured writer
//! concurrently, one task per backend. The call returns only after every
//! backend has answered. A failing backend is logged and reported in the
//! [`WriteReport`] but neither stops the others nor turns the request into an
//! error: writes are best-effort per backend.
//!
//! # Reads
//!
//! Exactly one reader must be configured. Merging range results from several
//! backends is not supported, so zero or multiple readers fail every read
//! before any backend is contacted.
//!
//! # Example
//!
//! ```rust
//! use redis_ts_adapter::backend::MemoryBackend;
//! use redis_ts_adapter::bridge::Bridge;
//! use redis_ts_adapter::types::{LabelMatcher, LabelSet, Query, Sample, TimeSeries};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(MemoryBackend::new("mem"));
//! let bridge = Bridge::builder().backend(backend).build();
//!
//! let labels: LabelSet = [("__name__", "up"), ("job", "node")].into_iter().collect();
//! bridge.write(&[TimeSeries::new(labels, vec![Sample::new(1_000, 1.0)])]).await;
//!
//! let query = Query::new(0, 2_000).with_matcher(LabelMatcher::equal("job", "node"));
//! let results = bridge.read(&[query]).await?;
//! assert_eq!(results[0].timeseries.len(), 1);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, error, warn};

use crate::backend::Backend;
use crate::error::{BackendError, Error, Result};
use crate::observer::{BridgeObserver, NoopObserver};
use crate::read;
use crate::types::{Query, QueryResult, TimeSeries};
use crate::write::{translate_observed, WriteCommand};

/// Outcome of one backend's share of a write
#[derive(Debug, Clone, PartialEq)]
pub struct BackendWriteReport {
    /// Backend name
    pub backend: String,
    /// Commands sent
    pub sent: usize,
    /// Commands that failed (all of them when the round trip failed)
    pub failed: usize,
    /// First error seen, if any
    pub error: Option<BackendError>,
    /// Time spent on this backend
    pub elapsed: Duration,
}

impl BackendWriteReport {
    /// Whether every command was stored
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.error.is_none()
    }
}

/// Outcome of a write request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteReport {
    /// Commands produced by translation
    pub commands: usize,
    /// Series dropped for lacking a metric name
    pub rejected_series: usize,
    /// Samples dropped for non-finite values
    pub rejected_samples: usize,
    /// One entry per configured writer, in configuration order
    pub backends: Vec<BackendWriteReport>,
}

impl WriteReport {
    /// Whether every backend stored every command
    pub fn all_succeeded(&self) -> bool {
        self.backends.iter().all(BackendWriteReport::is_success)
    }
}

/// Builder for [`Bridge`]
#[derive(Default)]
pub struct BridgeBuilder {
    writers: Vec<Arc<dyn Backend>>,
    readers: Vec<Arc<dyn Backend>>,
    observer: Option<Arc<dyn BridgeObserver>>,
}

impl BridgeBuilder {
    /// Register a backend as both writer and reader
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.writers.push(backend.clone());
        self.readers.push(backend);
        self
    }

    /// Register a write-only backend
    pub fn writer(mut self, backend: Arc<dyn Backend>) -> Self {
        self.writers.push(backend);
        self
    }

    /// Register a read-only backend
    pub fn reader(mut self, backend: Arc<dyn Backend>) -> Self {
        self.readers.push(backend);
        self
    }

    /// Set the observer (defaults to [`NoopObserver`])
    pub fn observer(mut self, observer: Arc<dyn BridgeObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Build the bridge
    pub fn build(self) -> Bridge {
        Bridge {
            writers: self.writers,
            readers: self.readers,
            observer: self.observer.unwrap_or_else(|| Arc::new(NoopObserver)),
        }
    }
}

/// Routes decoded requests to the configured backends
pub struct Bridge {
    writers: Vec<Arc<dyn Backend>>,
    readers: Vec<Arc<dyn Backend>>,
    observer: Arc<dyn BridgeObserver>,
}

impl Bridge {
    /// Start building a bridge
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::default()
    }

    /// Configured writers
    pub fn writers(&self) -> &[Arc<dyn Backend>] {
        &self.writers
    }

    /// Configured readers
    pub fn readers(&self) -> &[Arc<dyn Backend>] {
        &self.readers
    }

    /// Translate a batch and fan it out to every writer
    ///
    /// Never fails: per-backend failures are logged and returned in the
    /// report.
    pub async fn write(&self, batch: &[TimeSeries]) -> WriteReport {
        let translation = translate_observed(batch, self.observer.as_ref());
        let mut report = WriteReport {
            commands: translation.commands.len(),
            rejected_series: translation.rejected_series,
            rejected_samples: translation.rejected_samples,
            backends: Vec::with_capacity(self.writers.len()),
        };

        if self.writers.is_empty() {
            warn!(
                num_samples = report.commands,
                "No writers configured, dropping samples"
            );
            return report;
        }

        let commands = Arc::new(translation.commands);
        let tasks: Vec<_> = self
            .writers
            .iter()
            .map(|backend| {
                let backend = backend.clone();
                let commands = commands.clone();
                tokio::spawn(async move { send_commands(backend.as_ref(), &commands).await })
            })
            .collect();

        let joined = join_all(tasks).await;
        for (backend, result) in self.writers.iter().zip(joined) {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => BackendWriteReport {
                    backend: backend.name().to_string(),
                    sent: commands.len(),
                    failed: commands.len(),
                    error: Some(BackendError::Connection(format!("write task failed: {}", e))),
                    elapsed: Duration::ZERO,
                },
            };

            if let Some(e) = &outcome.error {
                warn!(
                    storage = %outcome.backend,
                    error = %e,
                    num_samples = outcome.sent,
                    failed = outcome.failed,
                    "Could not send samples to remote storage"
                );
            }
            self.observer
                .write_completed(&outcome.backend, outcome.sent, outcome.failed, outcome.elapsed);
            report.backends.push(outcome);
        }

        report
    }

    /// Answer a read request from the single configured reader
    pub async fn read(&self, queries: &[Query]) -> Result<Vec<QueryResult>> {
        let reader = match self.readers.as_slice() {
            [reader] => reader,
            readers => {
                return Err(Error::Configuration(format!(
                    "expected exactly one reader, found {} readers",
                    readers.len()
                )))
            },
        };

        let start = Instant::now();
        let result = read::read(reader.as_ref(), queries).await;
        self.observer
            .read_completed(queries.len(), start.elapsed(), result.is_ok());

        if let Err(e) = &result {
            error!(
                storage = reader.name(),
                queries = ?queries,
                error = %e,
                "Error executing query"
            );
        }
        result
    }
}

async fn send_commands(backend: &dyn Backend, commands: &[WriteCommand]) -> BackendWriteReport {
    let start = Instant::now();
    let mut report = BackendWriteReport {
        backend: backend.name().to_string(),
        sent: commands.len(),
        failed: 0,
        error: None,
        elapsed: Duration::ZERO,
    };

    if commands.is_empty() {
        return report;
    }

    match backend.execute_write_batch(commands).await {
        Ok(results) => {
            for result in results {
                if let Err(e) = result {
                    report.failed += 1;
                    report.error.get_or_insert(e);
                }
            }
        },
        Err(e) => {
            report.failed = commands.len();
            report.error = Some(e);
        },
    }

    report.elapsed = start.elapsed();
    debug!(
        storage = %report.backend,
        sent = report.sent,
        failed = report.failed,
        elapsed_us = report.elapsed.as_micros() as u64,
        "Write batch completed"
    );
    report
}
